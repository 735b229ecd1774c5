use std::sync::{Arc, Mutex};

use crate::nvm::memory::{copy_in, copy_out};
use crate::nvm::NonVolatileMemory;
use crate::{Error, Result};

/// インスタンスを共有可能な、メモリベースの`NonVolatileMemory`の実装.
///
/// 複製したインスタンス同士は同じバイト列を参照するため、
/// 一度アロケータに渡した領域を、後から別のアロケータで開き直すことができる.
///
/// # 注意
///
/// これはテスト用途のみを意図した実装であり、
/// `NonVolatileMemory`が本来要求する"不揮発性"は満たしていない.
#[derive(Debug, Clone, Default)]
pub struct SharedMemoryNvm {
    memory: Arc<Mutex<Vec<u8>>>,
}
impl SharedMemoryNvm {
    /// 新しい`SharedMemoryNvm`インスタンスを生成する.
    pub fn new(memory: Vec<u8>) -> Self {
        SharedMemoryNvm {
            memory: Arc::new(Mutex::new(memory)),
        }
    }

    /// 現在の内容のコピーを返す.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let memory = track!(self.memory.lock().map_err(Error::from))?;
        Ok(memory.clone())
    }
}
impl NonVolatileMemory for SharedMemoryNvm {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        let memory = track!(self.memory.lock().map_err(Error::from))?;
        track!(copy_out(&memory, buf, offset))
    }
    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        let mut memory = track!(self.memory.lock().map_err(Error::from))?;
        track!(copy_in(&mut memory, buf, offset))
    }
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
    fn size(&self) -> Result<u64> {
        let memory = track!(self.memory.lock().map_err(Error::from))?;
        Ok(memory.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::nvm::NonVolatileMemory;

    #[test]
    fn it_works() -> TestResult {
        let mut nvm = SharedMemoryNvm::new(vec![0; 1024]);
        assert_eq!(track!(nvm.size())?, 1024);

        let mut buf = vec![1; 512];
        track!(nvm.read_at(&mut buf, 0))?;
        assert_eq!(buf, vec![0; 512]);

        track!(nvm.write_at(&[1; 512][..], 1024))?;
        assert_eq!(track!(nvm.size())?, 1536);
        track!(nvm.read_at(&mut buf, 1024))?;
        assert_eq!(buf, vec![1; 512]);
        Ok(())
    }

    #[test]
    fn clones_share_contents() -> TestResult {
        let mut nvm = SharedMemoryNvm::default();
        let mut other = nvm.clone();

        track!(nvm.write_at(b"bar", 10))?;
        assert_eq!(track!(other.size())?, 13);

        let mut buf = [0; 3];
        track!(other.read_at(&mut buf, 10))?;
        assert_eq!(&buf, b"bar");
        assert_eq!(&track!(other.to_bytes())?[10..], b"bar");
        Ok(())
    }
}
