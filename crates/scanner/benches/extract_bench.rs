//! 버전 추출 벤치마크
//!
//! 프로브 출력 크기별 정규식 추출 성능을 측정합니다.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dofinder_scanner::extract_version;
use regex::Regex;

const SEMVER: &str = r"[0-9]+\.[0-9]+\.[0-9]+";

fn java_banner() -> String {
    "openjdk version \"11.0.9\" 2020-10-20\n\
     OpenJDK Runtime Environment (build 11.0.9+11-alpine-r1)\n\
     OpenJDK 64-Bit Server VM (build 11.0.9+11-alpine-r1, mixed mode)\n"
        .to_owned()
}

/// 버전 문자열이 맨 끝에 오는 긴 출력
fn noisy_output(lines: usize) -> String {
    let mut text = String::with_capacity(lines * 48);
    for i in 0..lines {
        text.push_str(&format!("usage line {i}: --flag value, see manual\n"));
    }
    text.push_str("perl 5.30.3 built for x86_64-linux\n");
    text
}

fn bench_short_outputs(c: &mut Criterion) {
    let pattern = Regex::new(SEMVER).unwrap();
    let mut group = c.benchmark_group("extract_short");

    group.bench_function("python", |b| {
        b.iter(|| extract_version(black_box("Python 3.9.1\n"), &pattern))
    });

    let java = java_banner();
    group.bench_function("java_banner", |b| {
        b.iter(|| extract_version(black_box(&java), &pattern))
    });

    group.bench_function("no_match", |b| {
        b.iter(|| extract_version(black_box("sh: python: not found\n"), &pattern))
    });

    group.finish();
}

fn bench_output_size(c: &mut Criterion) {
    let pattern = Regex::new(SEMVER).unwrap();
    let mut group = c.benchmark_group("extract_by_size");

    for lines in [10, 100, 1_000] {
        let text = noisy_output(lines);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &text, |b, text| {
            b.iter(|| extract_version(black_box(text), &pattern))
        });
    }

    group.finish();
}

fn bench_distro(c: &mut Criterion) {
    let pattern = Regex::new("(?i)(alpine|debian|ubuntu|centos|fedora|busybox)").unwrap();
    let os_release = "NAME=\"Debian GNU/Linux\"\nVERSION_ID=\"10\"\nID=debian\n";

    c.bench_function("extract_distro", |b| {
        b.iter(|| extract_version(black_box(os_release), &pattern))
    });
}

criterion_group!(benches, bench_short_outputs, bench_output_size, bench_distro);
criterion_main!(benches);
