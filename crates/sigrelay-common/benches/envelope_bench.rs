use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use sigrelay_common::{Envelope, Identity, IdentityGenerator, RandomIdentityGenerator};

fn offer_bytes() -> Vec<u8> {
    let sdp = "a".repeat(2048);
    Envelope::new("offer", json!({"remoteId": "V1StGXR8_Z5jdHi6B-myT", "sdp": sdp}))
        .to_json()
        .unwrap()
        .into_bytes()
}

fn bench_offer_parse(c: &mut Criterion) {
    let raw = offer_bytes();

    c.bench_function("offer_parse_2kb", |b| {
        b.iter(|| black_box(Envelope::parse(&raw).unwrap()));
    });
}

fn bench_offer_rewrite_encode(c: &mut Criterion) {
    let env = Envelope::parse(&offer_bytes()).unwrap();
    let sender = Identity::from("Uakgb_J5m9g-0JDMbcJqL");

    c.bench_function("offer_rewrite_encode_2kb", |b| {
        b.iter(|| {
            let mut env = env.clone();
            env.set_remote_id(&sender);
            black_box(env.to_json().unwrap())
        });
    });
}

fn bench_identity_next(c: &mut Criterion) {
    let gen = RandomIdentityGenerator::default();

    c.bench_function("identity_next", |b| {
        b.iter(|| black_box(gen.next()));
    });
}

criterion_group!(
    benches,
    bench_offer_parse,
    bench_offer_rewrite_encode,
    bench_identity_next
);
criterion_main!(benches);
