use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use aeron_core::ringbuf::{ManyToOneRingBuffer, TRAILER_LENGTH};

fn benchmark_burst_write_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("ManyToOneRingBuffer_Burst");

    for capacity in [4096usize, 65536, 1 << 20] {
        // 32-byte payloads become 48-byte records.
        let records_per_burst = (capacity / 48) as u64;
        group.throughput(Throughput::Elements(records_per_burst));
        group.bench_with_input(
            BenchmarkId::new("fill_then_drain_32b", capacity),
            &capacity,
            |b, &capacity| {
                let ring = ManyToOneRingBuffer::new(capacity + TRAILER_LENGTH).unwrap();
                let payload = [0u8; 32];

                b.iter(|| {
                    while ring.write(1, &payload).unwrap() {}
                    while ring.read(|_, _| {}, 128) != 0 {}
                });
            },
        );
    }

    group.finish();
}

fn benchmark_contended_writers(c: &mut Criterion) {
    let mut group = c.benchmark_group("ManyToOneRingBuffer_Contended");
    group.throughput(Throughput::Elements(1024));

    group.bench_function("two_producers_1024_msgs", |b| {
        let ring = std::sync::Arc::new(ManyToOneRingBuffer::new(65536 + TRAILER_LENGTH).unwrap());
        let payload = [0u8; 32];

        b.iter(|| {
            let writers: Vec<_> = (0..2)
                .map(|_| {
                    let ring = std::sync::Arc::clone(&ring);
                    std::thread::spawn(move || {
                        for _ in 0..512 {
                            while !ring.write(1, &payload).unwrap() {
                                std::hint::spin_loop();
                            }
                        }
                    })
                })
                .collect();

            let mut consumed = 0usize;
            while consumed < 1024 {
                consumed += ring.read(|_, _| {}, 128);
            }

            for writer in writers {
                writer.join().unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_burst_write_read, benchmark_contended_writers);
criterion_main!(benches);
