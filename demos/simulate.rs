// Harvests retweet and like edges from a synthetic API with injected faults.
// cargo run --release --example simulate -- [config.toml] [edges.jsonl]

use std::fs::File;
use std::io::BufWriter;
use std::time::Instant;

use engagegraph::generate::{Faults, SyntheticApi, SyntheticConfig};
use engagegraph::harvest::seeds_from;
use engagegraph::logging::{init_logging, LoggingConfig};
use engagegraph::{EdgeList, EdgeSink, Engagement, HarvestConfig, Harvester, JsonLinesSink, RecordingSleeper, ResolutionRequest};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&LoggingConfig::default());

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => HarvestConfig::load(path)?,
        None => HarvestConfig::default(),
    };
    let out_path = args.next().unwrap_or_else(|| "edges.jsonl".to_owned());

    let api = SyntheticApi::new(&SyntheticConfig::default())?.with_faults(Faults {
        rate_limit_every: Some(97),
        transient_every: Some(13),
    });
    // waits are recorded rather than slept so the demo finishes quickly
    let sleeper = std::sync::Arc::new(RecordingSleeper::new());
    let harvester = Harvester::new(&api, &config).with_sleeper(sleeper.clone());

    let start = Instant::now();
    let requests = ResolutionRequest::from_sources(api.sampled_tweets().iter().cloned());
    let resolved = harvester.resolve_originals(&requests)?;
    let seeds = seeds_from(&resolved);

    let mut file_sink = JsonLinesSink::new(BufWriter::new(File::create(&out_path)?));
    let mut all = EdgeList::new();
    for kind in [Engagement::Retweet, Engagement::Like] {
        let mut edges = EdgeList::new();
        harvester.harvest(kind, &seeds, &mut edges)?;
        file_sink.accept(kind, edges.as_slice())?;
        all.merge(edges);
    }
    file_sink.flush()?;

    let total = all.len();
    all.dedup();
    let dur = start.elapsed();
    tracing::info!(
        seeds = seeds.len(),
        edges = total,
        distinct = all.len(),
        users = all.unique_subjects(),
        authors = all.unique_objects(),
        calls = api.calls(),
        waits = sleeper.slept().len(),
        ?dur,
        out = %out_path,
        "done"
    );
    Ok(())
}
