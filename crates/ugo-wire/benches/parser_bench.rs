//! 流解析性能基准测试
//!
//! 遥测以 10ms 周期到达，解析一帧的预算远低于一个周期。
//! 基准覆盖整包到达与逐字节到达两种极端情况。

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ugo_wire::StreamParser;

/// 双臂 16 关节的典型一帧
fn dual_arm_packet() -> Vec<u8> {
    let ids: Vec<String> = (11..=18).chain(21..=28).map(|id| id.to_string()).collect();
    let angles: Vec<String> = (0..16).map(|i| (i * 37 % 1800).to_string()).collect();
    let series: Vec<String> = (0..16).map(|i| (i * 3).to_string()).collect();
    format!(
        "vsd, ,ver:251008,interval:10[ms],read:3[ms],write:1[ms]\nid,{}\nagl,{}\nvel,{}\ncur,{}\nobj,{}\n",
        ids.join(","),
        angles.join(","),
        series.join(","),
        series.join(","),
        angles.join(","),
    )
    .into_bytes()
}

fn bench_whole_packet(c: &mut Criterion) {
    let packet = dual_arm_packet();
    c.bench_function("feed_whole_packet", |b| {
        let mut parser = StreamParser::new();
        b.iter(|| {
            let frames = parser.feed(black_box(&packet));
            black_box(frames);
        });
    });
}

fn bench_byte_at_a_time(c: &mut Criterion) {
    let packet = dual_arm_packet();
    c.bench_function("feed_byte_at_a_time", |b| {
        let mut parser = StreamParser::new();
        b.iter(|| {
            for byte in &packet {
                let frames = parser.feed(std::slice::from_ref(byte));
                black_box(frames);
            }
        });
    });
}

fn bench_sustained_stream(c: &mut Criterion) {
    let packet = dual_arm_packet();
    c.bench_function("feed_100_packets", |b| {
        b.iter(|| {
            let mut parser = StreamParser::new();
            let mut total = 0usize;
            for _ in 0..100 {
                total += parser.feed(black_box(&packet)).len();
            }
            black_box(total);
        });
    });
}

criterion_group!(
    benches,
    bench_whole_packet,
    bench_byte_at_a_time,
    bench_sustained_stream
);
criterion_main!(benches);
