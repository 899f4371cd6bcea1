use std::path::{Path, PathBuf};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use shortlist::{
    fs::{FileMover, MoveError},
    photo::PhotoDraft,
    rating::{MatchmakingParams, PoolMember, RankingEngine, Rating, RatingParams, rate_pair},
    triage::{Destinations, TriageController},
    types::{Action, Outcome},
};

struct NoopMover;

impl FileMover for NoopMover {
    fn move_file(&self, _from: &Path, _to: &Path) -> Result<(), MoveError> {
        Ok(())
    }
}

fn pool(n: usize) -> RankingEngine {
    let mut engine = RankingEngine::new(
        RatingParams::default(),
        MatchmakingParams {
            seed: Some(1),
            ..MatchmakingParams::default()
        },
    );
    let members = (0..n)
        .map(|i| PoolMember {
            content_id: format!("{i:064x}"),
            location: PathBuf::from(format!("/accepted/{i}.jpg")),
            photo: None,
        })
        .collect();
    engine.sync_pool(members, true);
    engine
}

fn bench_rate_pair(c: &mut Criterion) {
    let params = RatingParams::default();
    let left = Rating::prior(&params);
    let right = Rating {
        mu: 28.0,
        sigma: 5.0,
        comparisons: 4,
    };
    c.bench_function("rate_pair", |b| {
        b.iter(|| rate_pair(left, right, Outcome::LeftWin, &params));
    });
}

fn bench_triage_10k(c: &mut Criterion) {
    c.bench_function("triage_decide_undo_10k", |b| {
        b.iter(|| {
            let mut triage = TriageController::new(Destinations::new("/keep", "/discard"));
            for i in 0..10_000u64 {
                triage
                    .register(PhotoDraft::from_path(format!("/photos/{i}.jpg"), "/photos"))
                    .expect("register");
            }
            while let Some(photo) = triage.current().map(|p| p.id.clone()) {
                triage
                    .decide(&NoopMover, &photo, Action::Accept)
                    .expect("decide");
            }
            while triage.undo(&NoopMover).is_ok() {}
        });
    });
}

fn bench_next_pair(c: &mut Criterion) {
    let mut group = c.benchmark_group("next_pair_compare");
    for n in [10usize, 100, 1000] {
        let mut engine = pool(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let (l, r) = engine.next_pair().expect("pair");
                engine.compare(&l, &r, Outcome::LeftWin).expect("compare");
            });
        });
    }
    group.finish();
}

fn bench_leaderboard(c: &mut Criterion) {
    let mut engine = pool(5_000);
    for _ in 0..2_000 {
        let (l, r) = engine.next_pair().expect("pair");
        engine.compare(&l, &r, Outcome::RightWin).expect("compare");
    }
    c.bench_function("leaderboard_5k", |b| {
        b.iter(|| engine.leaderboard(100));
    });
}

criterion_group!(benches, bench_rate_pair, bench_triage_10k, bench_next_pair, bench_leaderboard);
criterion_main!(benches);
