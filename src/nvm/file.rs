use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::nvm::NonVolatileMemory;
use crate::{ErrorKind, Result};

/// `FileNvm`のビルダ
///
/// exclusive_lock: `FileNvm`の実体ファイルに対するアクセスの排他制御を行うかどうか
///
/// ページヘッダは16バイト単位で読み書きされるため、
/// アライメントを要求するバッファリングなしI/O(e.g., `O_DIRECT`)には対応していない.
pub struct FileNvmBuilder {
    exclusive_lock: bool,
}

impl FileNvmBuilder {
    /// デフォルト設定で`FileNvmBuilder`インスタンスを作成する
    ///
    /// デフォルトでは、exclusive_lock = trueとなる
    pub fn new() -> Self {
        FileNvmBuilder {
            exclusive_lock: true,
        }
    }

    fn open_options(&self) -> fs::OpenOptions {
        let mut options = fs::OpenOptions::new();
        options.read(true).write(true).create(false);
        options
    }

    #[cfg(unix)]
    fn set_exclusive_file_lock_if_flag_is_on(&self, file: &File) -> Result<()> {
        use std::os::unix::io::AsRawFd;
        if self.exclusive_lock {
            if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } != 0 {
                track_io!(Err(io::Error::last_os_error()))
            } else {
                Ok(())
            }
        } else {
            Ok(())
        }
    }
    #[cfg(not(unix))]
    fn set_exclusive_file_lock_if_flag_is_on(&self, _file: &File) -> Result<()> {
        Ok(())
    }

    /// exclusive_lockのon/offを設定する
    pub fn exclusive_lock(&mut self, enabled: bool) -> &mut Self {
        self.exclusive_lock = enabled;
        self
    }

    /// 新しい`FileNvm`インスタンスを生成する.
    ///
    /// `filepath`が既に存在する場合にはそれを開き、存在しない場合には新規にファイルを作成する.
    ///
    /// 返り値のタプルの二番目の値は、ファイルが新規作成されたかどうか (`true`なら新規作成).
    pub fn create_if_absent<P: AsRef<Path>>(&mut self, filepath: P) -> Result<(FileNvm, bool)> {
        if filepath.as_ref().exists() {
            track!(self.open(filepath)).map(|s| (s, false))
        } else {
            track!(self.create(filepath)).map(|s| (s, true))
        }
    }

    /// ファイルを新規に作成して`FileNvm`インスタンスを生成する.
    ///
    /// 作成直後のファイルは空であり、アロケータによるオープン時に管理領域が初期化される.
    pub fn create<P: AsRef<Path>>(&mut self, filepath: P) -> Result<FileNvm> {
        if let Some(dir) = filepath.as_ref().parent() {
            track_io!(fs::create_dir_all(dir))?;
        }
        let mut options = self.open_options();
        options.create(true);
        let file = track_io!(options.open(filepath))?;
        track!(self.set_exclusive_file_lock_if_flag_is_on(&file))?;
        Ok(FileNvm::new(file))
    }

    /// 既存のファイルを開いて`FileNvm`インスタンスを生成する。
    pub fn open<P: AsRef<Path>>(&mut self, filepath: P) -> Result<FileNvm> {
        let options = self.open_options();
        let file = track_io!(options.open(filepath))?;
        track!(self.set_exclusive_file_lock_if_flag_is_on(&file))?;
        Ok(FileNvm::new(file))
    }
}
impl Default for FileNvmBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// ファイルベースの`NonVolatileMemory`の実装.
///
/// 同期には`fdatasync`相当(`File::sync_data`)が使用される.
#[derive(Debug)]
pub struct FileNvm {
    file: File,
}
impl FileNvm {
    /// デフォルト設定で新しい`FileNvm`インスタンスを生成する.
    ///
    /// デフォルト設定では、ファイルアクセスに対する排他制御を行う。
    ///
    /// `filepath`が既に存在する場合にはそれを開き、存在しない場合には新規にファイルを作成する.
    ///
    /// 返り値のタプルの二番目の値は、ファイルが新規作成されたかどうか (`true`なら新規作成).
    pub fn create_if_absent<P: AsRef<Path>>(filepath: P) -> Result<(Self, bool)> {
        FileNvmBuilder::new().create_if_absent(filepath)
    }

    /// デフォルト設定でファイルを新規に作成して`FileNvm`インスタンスを生成する.
    pub fn create<P: AsRef<Path>>(filepath: P) -> Result<Self> {
        FileNvmBuilder::new().create(filepath)
    }

    /// デフォルト設定で既存のファイルを開き`FileNvm`インスタンスを生成する。
    pub fn open<P: AsRef<Path>>(filepath: P) -> Result<Self> {
        FileNvmBuilder::new().open(filepath)
    }

    fn new(file: File) -> FileNvm {
        FileNvm { file }
    }

    fn read_impl(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        track_io!(self.file.seek(SeekFrom::Start(offset)))?;
        let mut read_size = 0;
        while read_size < buf.len() {
            match self.file.read(&mut buf[read_size..]) {
                Ok(0) => break,
                Ok(n) => read_size += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return track_io!(Err(e)),
            }
        }

        // まだ未書き込みの末尾部分はゼロとして扱う
        for b in &mut buf[read_size..] {
            *b = 0;
        }
        Ok(())
    }
    fn write_impl(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        track_assert!(
            offset.checked_add(buf.len() as u64).is_some(),
            ErrorKind::InvalidInput
        );
        track_io!(self.file.seek(SeekFrom::Start(offset)))?;
        track_io!(self.file.write_all(buf))?;
        Ok(())
    }

    #[cfg(test)]
    fn inner(&self) -> &File {
        &self.file
    }
}
impl NonVolatileMemory for FileNvm {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        track!(self.read_impl(buf, offset))
    }
    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        track!(self.write_impl(buf, offset))
    }
    fn sync(&mut self) -> Result<()> {
        track_io!(self.file.sync_data())?;
        Ok(())
    }
    fn size(&self) -> Result<u64> {
        let metadata = track_io!(self.file.metadata())?;
        Ok(metadata.len())
    }
}

#[cfg(test)]
mod tests {
    use std::mem;
    use tempdir::TempDir;
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn open_and_create_works() -> TestResult {
        let dir = track_io!(TempDir::new("filealloc_test"))?;

        // 存在しないファイルは開けない
        assert!(FileNvm::open(dir.path().join("foo")).is_err());

        // ファイル作成
        let mut file = track!(FileNvm::create(dir.path().join("foo")))?;
        assert_eq!(track!(file.size())?, 0);
        track!(file.write_at(b"bar", 512))?;
        track!(file.sync())?;
        assert_eq!(track!(file.size())?, 515);

        // 同じファイルを同時に開くことはできない
        assert!(FileNvm::open(dir.path().join("foo")).is_err());
        assert!(FileNvm::create(dir.path().join("foo")).is_err());

        // 一度閉じれば、オープン可能
        mem::drop(file);
        let mut file = track!(FileNvm::open(dir.path().join("foo")))?;
        let mut buf = [0; 3];
        track!(file.read_at(&mut buf, 512))?;
        assert_eq!(&buf, b"bar");
        Ok(())
    }

    #[test]
    fn create_if_absent_works() -> TestResult {
        let dir = track_io!(TempDir::new("filealloc_test"))?;

        // 作成
        assert!(!dir.path().join("foo").exists());
        let (mut file, created) = track!(FileNvm::create_if_absent(dir.path().join("foo")))?;
        assert!(created);
        track!(file.write_at(&[7; 512][..], 0))?;
        mem::drop(file);

        // オープン
        assert!(dir.path().join("foo").exists());
        let (mut file, created) = track!(FileNvm::create_if_absent(dir.path().join("foo")))?;
        assert!(!created);
        let mut buf = vec![0; 512];
        track!(file.read_at(&mut buf[..], 0))?;
        assert_eq!(buf, vec![7; 512]);
        Ok(())
    }

    #[test]
    fn nvm_operations_works() -> TestResult {
        let dir = track_io!(TempDir::new("filealloc_test"))?;

        let mut nvm = track!(FileNvm::create(dir.path().join("foo")))?;
        track!(nvm.write_at(&[0; 1024][..], 0))?;
        assert_eq!(track!(nvm.size())?, 1024);

        // read, write
        let mut buf = vec![1; 512];
        track!(nvm.read_at(&mut buf, 0))?;
        assert_eq!(buf, vec![0; 512]);

        track!(nvm.write_at(&[1; 16][..], 528))?;
        track!(nvm.read_at(&mut buf[..16], 528))?;
        assert_eq!(&buf[..16], &[1; 16][..]);
        assert_eq!(track!(nvm.size())?, 1024);

        // 末尾以降はゼロとして読める
        let mut buf = [9; 8];
        track!(nvm.read_at(&mut buf, 1020))?;
        assert_eq!(buf, [0; 8]);
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn disabling_exclusive_lock_works() -> TestResult {
        let dir = track_io!(TempDir::new("filealloc_test"))?;
        let first = track!(FileNvmBuilder::new()
            .exclusive_lock(false)
            .create(dir.path().join("foo")))?;
        let second = track!(FileNvmBuilder::new()
            .exclusive_lock(false)
            .open(dir.path().join("foo")))?;
        assert!(first.inner().metadata().is_ok());
        assert!(second.inner().metadata().is_ok());
        Ok(())
    }
}
