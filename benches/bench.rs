use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use engagegraph::generate::{SyntheticApi, SyntheticConfig};
use engagegraph::{
    BatchResolver, EngagementApi, Engagement, Identifier, PaginatedCollector, RecordingSleeper, Resolution,
    ResolutionRequest, RetryPolicy,
};

fn criterion_benchmark(c: &mut Criterion) {
    let config = SyntheticConfig::default();
    let api = SyntheticApi::new(&config).unwrap();
    let collector = PaginatedCollector::new(RetryPolicy::default()).with_sleeper(RecordingSleeper::new());

    let mut group = c.benchmark_group("collect");
    group.throughput(Throughput::Elements(api.total_engagements(Engagement::Retweet) as u64));
    group.bench_function("all_retweeters", |b| {
        b.iter(|| {
            let mut total = 0;
            for n in 0..config.tweets as u64 {
                let tweet = Identifier::Num(n);
                let users = collector
                    .collect_all(&tweet, |t, token| api.engagers(Engagement::Retweet, t, token))
                    .unwrap();
                total += users.len();
            }
            black_box(total)
        })
    });
    group.finish();

    let resolver = BatchResolver::new(RetryPolicy::default(), 100).with_sleeper(RecordingSleeper::new());
    let requests = ResolutionRequest::from_sources((0..100_000u64).map(Identifier::from));
    let mut group = c.benchmark_group("resolve");
    group.throughput(Throughput::Elements(requests.len() as u64));
    group.bench_function("self_references", |b| {
        b.iter(|| {
            resolver
                .resolve(&requests, 100, |ids| {
                    Ok(ids
                        .iter()
                        .map(|id| (id.clone(), Resolution::from(id.clone())))
                        .collect::<HashMap<_, _>>())
                })
                .unwrap()
        })
    });
    group.finish()
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
