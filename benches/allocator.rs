#![feature(test)]
extern crate filealloc;
extern crate tempdir;
extern crate test;
#[macro_use]
extern crate trackable;

use filealloc::allocator::{Allocator, AllocatorBuilder};
use filealloc::nvm::{FileNvm, MemoryNvm};
use tempdir::TempDir;
use test::Bencher;

#[bench]
fn memory_alloc_free_small(b: &mut Bencher) {
    let mut allocator = track_try_unwrap!(Allocator::open(MemoryNvm::default()));
    b.iter(|| {
        let offset = track_try_unwrap!(allocator.alloc(100, false)).offset().unwrap();
        track_try_unwrap!(allocator.free(offset));
    });
}

#[bench]
fn memory_alloc_by_split(b: &mut Bencher) {
    let mut allocator = track_try_unwrap!(Allocator::open(MemoryNvm::default()));
    b.iter(|| {
        let large = track_try_unwrap!(allocator.alloc(1024 * 1024, false))
            .offset()
            .unwrap();
        track_try_unwrap!(allocator.free(large));
        let small = track_try_unwrap!(allocator.alloc(100, false)).offset().unwrap();
        track_try_unwrap!(allocator.free(small));
    });
}

#[bench]
fn memory_alloc_by_growth(b: &mut Bencher) {
    let mut allocator = track_try_unwrap!(AllocatorBuilder::new()
        .splitting(false)
        .open(MemoryNvm::default()));
    b.iter(|| {
        track_try_unwrap!(allocator.alloc(100, false));
    });
}

#[bench]
fn file_alloc_free_small(b: &mut Bencher) {
    let dir = TempDir::new("filealloc_bench").unwrap();
    let nvm = track_try_unwrap!(FileNvm::create(dir.path().join("bench.alloc")));
    let mut allocator = track_try_unwrap!(Allocator::open(nvm));
    b.iter(|| {
        let offset = track_try_unwrap!(allocator.alloc(100, false)).offset().unwrap();
        track_try_unwrap!(allocator.free(offset));
    });
}
