use crate::nvm::NonVolatileMemory;
use crate::{ErrorKind, Result};

/// メモリベースの`NonVolatileMemory`の実装.
///
/// # 注意
///
/// これは主にテストや性能計測用途を意図した実装であり、
/// `NonVolatileMemory`が本来要求する"不揮発性"は満たしていない.
#[derive(Debug, Default, Clone)]
pub struct MemoryNvm {
    memory: Vec<u8>,
}
impl MemoryNvm {
    /// 新しい`MemoryNvm`インスタンスを生成する.
    pub fn new(memory: Vec<u8>) -> Self {
        MemoryNvm { memory }
    }

    /// 保持しているバイト列への参照を返す.
    pub fn as_bytes(&self) -> &[u8] {
        &self.memory
    }

    /// 保持しているバイト列を返して、インスタンスを破棄する.
    pub fn into_bytes(self) -> Vec<u8> {
        self.memory
    }
}
impl NonVolatileMemory for MemoryNvm {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        copy_out(&self.memory, buf, offset)
    }
    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        copy_in(&mut self.memory, buf, offset)
    }
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
    fn size(&self) -> Result<u64> {
        Ok(self.memory.len() as u64)
    }
}

/// `memory`の`offset`以降の内容を`buf`にコピーする.
///
/// 範囲外の部分はゼロで埋められる.
pub(crate) fn copy_out(memory: &[u8], buf: &mut [u8], offset: u64) -> Result<()> {
    let start = track!(to_index(offset))?;
    for b in buf.iter_mut() {
        *b = 0;
    }
    if start < memory.len() {
        let len = std::cmp::min(memory.len() - start, buf.len());
        buf[..len].copy_from_slice(&memory[start..start + len]);
    }
    Ok(())
}

/// `buf`の内容を`memory`の`offset`の位置にコピーする.
///
/// 必要に応じて`memory`はゼロで拡張される.
pub(crate) fn copy_in(memory: &mut Vec<u8>, buf: &[u8], offset: u64) -> Result<()> {
    let start = track!(to_index(offset))?;
    let end = track_assert_some!(start.checked_add(buf.len()), ErrorKind::InvalidInput);
    if memory.len() < end {
        memory.resize(end, 0);
    }
    memory[start..end].copy_from_slice(buf);
    Ok(())
}

fn to_index(offset: u64) -> Result<usize> {
    track_assert!(
        offset <= usize::max_value() as u64,
        ErrorKind::InvalidInput,
        "Too large offset: {}",
        offset
    );
    Ok(offset as usize)
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::nvm::NonVolatileMemory;

    #[test]
    fn it_works() -> TestResult {
        let mut nvm = MemoryNvm::new(vec![0; 1024]);
        assert_eq!(track!(nvm.size())?, 1024);

        // read, write
        let mut buf = vec![1; 512];
        track!(nvm.read_at(&mut buf, 0))?;
        assert_eq!(buf, vec![0; 512]);

        track!(nvm.write_at(&[1; 512][..], 512))?;
        track!(nvm.read_at(&mut buf, 512))?;
        assert_eq!(buf, vec![1; 512]);
        assert_eq!(track!(nvm.size())?, 1024);

        // 非アライメントな読み書き
        track!(nvm.write_at(b"foo", 3))?;
        let mut buf = [0; 5];
        track!(nvm.read_at(&mut buf, 2))?;
        assert_eq!(&buf, b"\0foo\0");
        Ok(())
    }

    #[test]
    fn write_beyond_end_extends_memory() -> TestResult {
        let mut nvm = MemoryNvm::default();
        assert_eq!(track!(nvm.size())?, 0);

        track!(nvm.write_at(&[7; 16][..], 100))?;
        assert_eq!(track!(nvm.size())?, 116);
        assert_eq!(&nvm.as_bytes()[..100], &[0; 100][..]);
        assert_eq!(&nvm.as_bytes()[100..], &[7; 16][..]);
        Ok(())
    }

    #[test]
    fn read_beyond_end_yields_zeros() -> TestResult {
        let mut nvm = MemoryNvm::new(vec![9; 10]);
        let mut buf = [1; 16];
        track!(nvm.read_at(&mut buf, 8))?;
        assert_eq!(&buf[..2], &[9, 9]);
        assert_eq!(&buf[2..], &[0; 14][..]);
        Ok(())
    }
}
