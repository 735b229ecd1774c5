use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

/// 一つのサイズに対して保持しておくバッファの最大数.
const MAX_POOLED_BUFFERS_PER_SIZE: usize = 16;

static GLOBAL_POOL: BufferPool = BufferPool::new();

/// サイズ毎に再利用可能な一時バッファを保持するプール.
///
/// ヘッダやディレクトリの読み書きの度にバッファを確保するコストを省くために使用される.
/// 性能上の工夫に過ぎず、プールの状態が正しさに影響を与えることはない.
///
/// `get`で取り出したバッファは、スコープを抜ける際(エラーによる早期リターンも含む)に
/// 自動でプールに返却される.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<BTreeMap<usize, Vec<Vec<u8>>>>,
}
impl BufferPool {
    /// 空のプールを生成する.
    pub const fn new() -> Self {
        BufferPool {
            buffers: Mutex::new(BTreeMap::new()),
        }
    }

    /// プロセス全体で共有されるプールを返す.
    pub fn global() -> &'static BufferPool {
        &GLOBAL_POOL
    }

    /// `size`バイトのゼロ埋めされたバッファを取り出す.
    pub fn get(&self, size: usize) -> PooledBuffer {
        let reused = self
            .buffers
            .lock()
            .ok()
            .and_then(|mut buffers| buffers.get_mut(&size).and_then(|v| v.pop()));
        let buf = match reused {
            Some(mut buf) => {
                for b in buf.iter_mut() {
                    *b = 0;
                }
                buf
            }
            None => vec![0; size],
        };
        PooledBuffer { pool: self, buf }
    }

    /// 指定サイズのバッファが、現在いくつプールされているかを返す.
    pub fn pooled_count(&self, size: usize) -> usize {
        self.buffers
            .lock()
            .ok()
            .and_then(|buffers| buffers.get(&size).map(|v| v.len()))
            .unwrap_or(0)
    }

    fn put_back(&self, buf: Vec<u8>) {
        // ロックが壊れている場合は、単に破棄する
        if let Ok(mut buffers) = self.buffers.lock() {
            let pooled = buffers.entry(buf.len()).or_insert_with(Vec::new);
            if pooled.len() < MAX_POOLED_BUFFERS_PER_SIZE {
                pooled.push(buf);
            }
        }
    }
}
impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// `BufferPool`から取り出されたバッファ.
///
/// 破棄時に、取り出し元のプールに返却される.
#[derive(Debug)]
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buf: Vec<u8>,
}
impl<'a> Deref for PooledBuffer<'a> {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}
impl<'a> DerefMut for PooledBuffer<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}
impl<'a> Drop for PooledBuffer<'a> {
    fn drop(&mut self) {
        let buf = std::mem::replace(&mut self.buf, Vec::new());
        self.pool.put_back(buf);
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::{ErrorKind, Result};

    #[test]
    fn buffers_are_reused() {
        let pool = BufferPool::new();
        assert_eq!(pool.pooled_count(16), 0);
        {
            let mut buf = pool.get(16);
            assert_eq!(buf.len(), 16);
            buf[0] = 0xFF;
        }
        assert_eq!(pool.pooled_count(16), 1);

        // 再利用されたバッファはゼロ埋めされている
        let buf = pool.get(16);
        assert_eq!(&buf[..], &[0; 16][..]);
        assert_eq!(pool.pooled_count(16), 0);
    }

    #[test]
    fn buffers_are_returned_on_error() -> TestResult {
        let pool = BufferPool::new();
        let fails = || -> Result<()> {
            let _buf = pool.get(240);
            track_panic!(ErrorKind::Other, "oops");
        };
        assert!(fails().is_err());
        assert_eq!(pool.pooled_count(240), 1);
        Ok(())
    }

    #[test]
    fn pool_size_is_bounded() {
        let pool = BufferPool::new();
        let bufs = (0..MAX_POOLED_BUFFERS_PER_SIZE + 4)
            .map(|_| pool.get(8))
            .collect::<Vec<_>>();
        drop(bufs);
        assert_eq!(pool.pooled_count(8), MAX_POOLED_BUFFERS_PER_SIZE);
    }
}
