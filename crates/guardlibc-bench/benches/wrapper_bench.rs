//! Wrapped versus direct libc calls on the success path.

use std::ffi::{CStr, c_void};

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use guardlibc_abi::{malloc_abi, string_abi, unistd_abi};

fn bench_alloc_free_cycle(c: &mut Criterion) {
    let sizes: &[usize] = &[16, 256, 4096, 32768];
    let mut group = c.benchmark_group("alloc_free_cycle");

    for &size in sizes {
        group.bench_with_input(BenchmarkId::new("guardlibc", size), &size, |b, &sz| {
            b.iter(|| {
                let Ok(p) = malloc_abi::malloc(black_box(sz)) else {
                    return;
                };
                let mut raw = p.as_ptr();
                unsafe { malloc_abi::free(&mut raw) };
            });
        });
        group.bench_with_input(BenchmarkId::new("libc", size), &size, |b, &sz| {
            b.iter(|| unsafe {
                let p = libc::malloc(black_box(sz));
                libc::free(p);
            });
        });
    }
    group.finish();
}

fn bench_memcpy_sizes(c: &mut Criterion) {
    let sizes: &[usize] = &[16, 256, 4096, 65536];
    let mut group = c.benchmark_group("memcpy");

    for &size in sizes {
        let src = vec![0xABu8; size];
        let mut dst = vec![0u8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("guardlibc", size), &size, |b, &sz| {
            b.iter(|| unsafe {
                let r = malloc_abi::memcpy(
                    dst.as_mut_ptr().cast::<c_void>(),
                    src.as_ptr().cast::<c_void>(),
                    black_box(sz),
                );
                black_box(r.is_ok());
            });
        });
        group.bench_with_input(BenchmarkId::new("libc", size), &size, |b, &sz| {
            b.iter(|| unsafe {
                libc::memcpy(
                    dst.as_mut_ptr().cast::<c_void>(),
                    src.as_ptr().cast::<c_void>(),
                    black_box(sz),
                );
            });
        });
    }
    group.finish();
}

fn bench_strlen(c: &mut Criterion) {
    let sizes: &[usize] = &[16, 256, 4096];
    let mut group = c.benchmark_group("strlen");

    for &size in sizes {
        let mut bytes = vec![b'A'; size];
        bytes.push(0);
        let Ok(s) = CStr::from_bytes_with_nul(&bytes) else {
            continue;
        };
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("guardlibc", size), &size, |b, _| {
            b.iter(|| black_box(string_abi::strlen(Some(black_box(s)))));
        });
        group.bench_with_input(BenchmarkId::new("libc", size), &size, |b, _| {
            b.iter(|| black_box(unsafe { libc::strlen(black_box(s).as_ptr()) }));
        });
    }
    group.finish();
}

fn bench_pipe_round_trip(c: &mut Criterion) {
    let Ok([rd, wr]) = unistd_abi::pipe() else {
        return;
    };
    let msg = [0x5au8; 64];
    let mut back = [0u8; 64];
    let mut group = c.benchmark_group("pipe_round_trip");
    group.throughput(Throughput::Bytes(msg.len() as u64));

    group.bench_function("guardlibc", |b| {
        b.iter(|| {
            let _ = unistd_abi::write(wr, &msg, msg.len());
            black_box(unistd_abi::read(rd, &mut back, back.len()).ok());
        });
    });
    group.bench_function("libc", |b| {
        b.iter(|| unsafe {
            libc::write(wr, msg.as_ptr().cast(), msg.len());
            black_box(libc::read(rd, back.as_mut_ptr().cast(), back.len()));
        });
    });
    group.finish();

    let _ = unistd_abi::close(rd);
    let _ = unistd_abi::close(wr);
}

criterion_group!(
    benches,
    bench_alloc_free_cycle,
    bench_memcpy_sizes,
    bench_strlen,
    bench_pipe_round_trip
);
criterion_main!(benches);
