//! Benchmarks for fixed-width line decoding and record serialisation.

use chrono::FixedOffset;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use cdr_relay::call_record::serialise_record;
use cdr_relay::{CaptureZone, DeviceProfile, FixedWidthDecoder};

fn hipath_line(code: &str) -> String {
    format!(
        "{:<16}{:>3}{:<6}{:>5}{:>8}{:<25}{:11}{:>2}\r\n",
        "01.03.2412:34:56", "1", "201", "00:05", "00:01:23", "030123456", "", code
    )
}

fn decoder() -> FixedWidthDecoder {
    let utc = FixedOffset::east_opt(0).map_or(CaptureZone::Local, CaptureZone::Fixed);
    FixedWidthDecoder::new(
        DeviceProfile::hipath()
            .with_zone(utc)
            .with_voicemail_extensions(["299"]),
    )
}

fn bench_decode(c: &mut Criterion) {
    let decoder = decoder();
    let mut group = c.benchmark_group("decode");
    for (name, code) in [("incoming", "0"), ("received", "1"), ("outgoing", "2")] {
        let line = hipath_line(code);
        group.throughput(Throughput::Bytes(line.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &line, |b, line| {
            b.iter(|| decoder.decode(black_box(line.as_bytes())))
        });
    }
    group.bench_function("short_line", |b| {
        b.iter(|| decoder.decode(black_box(b"01.03.2412:34:56  1201")))
    });
    group.finish();
}

fn bench_serialise(c: &mut Criterion) {
    let record = decoder()
        .decode(hipath_line("1").as_bytes())
        .expect("benchmark line decodes");
    c.bench_function("serialise_record", |b| {
        b.iter(|| serialise_record(black_box(&record)))
    });
}

criterion_group!(benches, bench_decode, bench_serialise);
criterion_main!(benches);
