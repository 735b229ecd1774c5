//! ページ境界(割当の最小単位)および一時バッファ関連の構成要素.
pub use self::buffer_pool::{BufferPool, PooledBuffer};

mod buffer_pool;

/// ファイル上のページ境界を表現するための構造体.
///
/// 全てのページの開始位置は、この境界にアライメントされている必要がある.
///
/// 指定されたサイズの境界にアライメントを行うための補助メソッド群も提供している.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockSize(u16);
impl BlockSize {
    /// ブロックサイズの最小値.
    ///
    /// 最小ランクのページサイズ、およびヘッダ領域のサイズと等しい.
    ///
    /// また`BlockSize::default()`で使われる値でもある.
    pub const MIN: u16 = 512;

    /// 最小のブロックサイズを持つ`BlockSize`インスタンスを返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use filealloc::block::BlockSize;
    ///
    /// assert_eq!(BlockSize::min().as_u16(), BlockSize::MIN);
    /// ```
    pub fn min() -> Self {
        BlockSize(Self::MIN)
    }

    /// 指定位置より後方の最初のブロック境界位置を返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use filealloc::block::BlockSize;
    ///
    /// let block_size = BlockSize::min();
    /// assert_eq!(block_size.ceil_align(0), 0);
    /// assert_eq!(block_size.ceil_align(1), 512);
    /// assert_eq!(block_size.ceil_align(512), 512);
    /// ```
    pub fn ceil_align(self, position: u64) -> u64 {
        let block_size = u64::from(self.0);
        (position + block_size - 1) / block_size * block_size
    }

    /// ブロックサイズ値を`u16`に変換して返す.
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// 指定位置がブロック境界に沿っているかどうかを判定する.
    ///
    /// # Examples
    ///
    /// ```
    /// use filealloc::block::BlockSize;
    ///
    /// let block_size = BlockSize::min();
    /// assert!(block_size.is_aligned(0));
    /// assert!(block_size.is_aligned(512));
    /// assert!(block_size.is_aligned(1024));
    ///
    /// assert!(!block_size.is_aligned(511));
    /// assert!(!block_size.is_aligned(513));
    /// ```
    pub fn is_aligned(self, position: u64) -> bool {
        (position % u64::from(self.0)) == 0
    }
}
impl Default for BlockSize {
    fn default() -> Self {
        Self::min()
    }
}
