use criterion::{criterion_group, criterion_main, Criterion};
use unitdex_core::tokenizer::{tokenize, StopwordsMode, TokenizerConfig};

const SAMPLE: &str = "2024-05-01T12:00:03Z ERROR worker-7 failed to flush segment #42 (disk quota exceeded); \
retrying in 30s. The café's Ｆｕｌｌｗｉｄｔｈ sign said: \"open 9-17\", name: Alice | role: admin";

fn bench_tokenize(c: &mut Criterion) {
    let text = SAMPLE.repeat(64);
    let default = TokenizerConfig::default();
    let english = TokenizerConfig { stopwords_mode: StopwordsMode::English, keep_numbers: false, ..Default::default() };
    c.bench_function("tokenize_default", |b| b.iter(|| tokenize(&text, &default)));
    c.bench_function("tokenize_english_no_numbers", |b| b.iter(|| tokenize(&text, &english)));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
