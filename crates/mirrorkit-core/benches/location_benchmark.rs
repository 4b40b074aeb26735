use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mirrorkit_core::mirror::MirrorLocator;

fn generate_urls(count: usize) -> Vec<String> {
    let spellings = [
        "https://Example.com/org/repo_{}.git",
        "https://example.com/org/repo_{}/",
        "ssh://git@example.com/org/repo_{}.git/",
        "git@Example.com:org/repo_{}.git",
        "/srv/git/repo_{}",
    ];
    (0..count)
        .map(|i| spellings[i % spellings.len()].replace("{}", &i.to_string()))
        .collect()
}

fn bench_normalize_url(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_url");

    for count in [10, 100, 1000] {
        let urls = generate_urls(count);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &urls, |b, urls| {
            b.iter(|| {
                for url in urls {
                    let _ = MirrorLocator::normalize_url(black_box(url));
                }
            });
        });
    }

    group.finish();
}

fn bench_mirror_dir(c: &mut Criterion) {
    let mut group = c.benchmark_group("mirror_dir");
    let locator = MirrorLocator::new("/var/cache/mirrors");

    for count in [10, 100, 1000] {
        let urls = generate_urls(count);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &urls, |b, urls| {
            b.iter(|| {
                for url in urls {
                    let _ = locator.mirror_dir(black_box(url));
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_normalize_url, bench_mirror_dir);
criterion_main!(benches);
