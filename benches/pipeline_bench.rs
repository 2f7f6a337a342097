use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dupcore::config::EngineConfig;
use dupcore::Engine;

fn repeating_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + 7) % 251) as u8).collect()
}

fn bench_pipeline(c: &mut Criterion) {
    let data = repeating_payload(4 * 1024 * 1024);

    c.bench_function("pipeline_compress_4mb_fresh", |b| {
        b.iter(|| {
            let config = EngineConfig::default();
            let mut engine = Engine::new(config, Box::new(|_: &[u8]| {})).unwrap();
            for chunk in black_box(&data).chunks(256 * 1024) {
                engine.compress(chunk, false).unwrap();
            }
            engine.flush_block().unwrap();
        })
    });

    c.bench_function("pipeline_compress_4mb_duplicate_pass", |b| {
        let config = EngineConfig::default();
        let mut engine = Engine::new(config, Box::new(|_: &[u8]| {})).unwrap();
        for chunk in data.chunks(256 * 1024) {
            engine.compress(chunk, false).unwrap();
        }
        engine.flush_block().unwrap();

        b.iter(|| {
            for chunk in black_box(&data).chunks(256 * 1024) {
                engine.compress(chunk, false).unwrap();
            }
            engine.flush_block().unwrap();
        })
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
