use trackable::error::ErrorKindExt;

/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if let Some(e) = e.get_ref().and_then(|e| e.downcast_ref::<Error>()).cloned() {
            e
        } else if e.kind() == std::io::ErrorKind::InvalidInput {
            ErrorKind::InvalidInput.cause(e).into()
        } else {
            ErrorKind::Other.cause(e).into()
        }
    }
}
impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        if *e.kind() == ErrorKind::InvalidInput {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
        } else {
            std::io::Error::new(std::io::ErrorKind::Other, e)
        }
    }
}
impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ErrorKind::Other.cause(e.to_string()).into()
    }
}

/// 発生し得るエラーの種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 解放やサイズ問い合わせに渡されたオフセットが不正.
    ///
    /// ページ境界に沿っていない、ファイルの範囲外を指している、
    /// あるいは有効なページヘッダを指していない場合に、このエラーが返される.
    ///
    /// 操作は拒否され、永続化された状態は何も変更されない.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して、`alloc`が返したオフセットのみを渡すようにする
    InvalidOffset,

    /// 既に解放済みのページを再度解放しようとした.
    ///
    /// 操作は拒否され、状態は変更されない. 致命的なエラーではない.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側の所有権管理を見直す
    DoubleFree,

    /// 内部状態が不整合に陥っている.
    ///
    /// 操作の途中で、ページのランクが範囲外になっている等の破損が見つかった場合に返される.
    ///
    /// # 典型的な対応策
    ///
    /// - ファイルを開き直す
    /// - 外部で修復を行う
    InconsistentState,

    /// ファイルが破損している.
    ///
    /// オープン時に、フリーリストの先頭がファイルの範囲外を指している場合等に返される.
    ///
    /// # 典型的な対応策
    ///
    /// - もし人手で復旧可能な場合には復旧する
    /// - それが無理であれば、諦めて初期化(全削除)を行う
    StorageCorrupted,

    /// 要求された機能がサポートされていない.
    ///
    /// 現時点では、修復モードでのオープンがこれに該当する.
    Unsupported,

    /// 入力が不正.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して入力を正しくする
    InvalidInput,

    /// その他エラー.
    ///
    /// E.g., I/Oエラー
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側で（指数バックオフ等を挟みつつ）何度かリトライ
    ///   - それでもダメなら、致命的な異常が発生していると判断
    Other,
}
impl trackable::error::ErrorKind for ErrorKind {}
