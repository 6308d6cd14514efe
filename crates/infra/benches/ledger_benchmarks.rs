use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use jobportal_core::{AggregateId, ExpectedVersion, PrincipalId};
use jobportal_events::execute;
use jobportal_infra::command_dispatcher::CommandDispatcher;
use jobportal_infra::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use jobportal_infra::{Deployment, InMemoryBus, InMemoryPortal, InMemoryTreasury};
use jobportal_ledger::{
    AGGREGATE_TYPE, Amount, DeployLedger, JobId, JobLedger, JobPosted, LedgerCommand, LedgerEvent,
    LedgerId, PostJob, TransitionRules,
};
use jobportal_auth::Principal;
use std::sync::Arc;

const FEE: Amount = Amount::new(10);

fn deployed_portal(postings: usize) -> InMemoryPortal {
    let portal = InMemoryPortal::deploy_in_memory(
        Arc::new(InMemoryTreasury::new()),
        Deployment::new(PrincipalId::random(), FEE),
    )
    .unwrap();
    let poster = PrincipalId::random();
    for _ in 0..postings {
        portal.post_job(poster, FEE).unwrap();
    }
    portal
}

fn bench_post_job_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("post_job_latency");
    group.sample_size(200);

    // Every command replays the whole stream, so latency grows with history.
    for history in [0usize, 10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("portal_post_job", history),
            history,
            |b, &history| {
                let portal = deployed_portal(history);
                let poster = PrincipalId::random();
                b.iter(|| {
                    black_box(portal.post_job(poster, black_box(FEE)).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_event_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_append_throughput");

    for batch_size in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("batch_append", batch_size),
            batch_size,
            |b, &size| {
                let store = InMemoryEventStore::new();
                let ledger_id = LedgerId::generate();
                let poster = PrincipalId::random();

                b.iter(|| {
                    let events: Vec<UncommittedEvent> = (0..size)
                        .map(|i| {
                            let event = LedgerEvent::JobPosted(JobPosted {
                                ledger_id,
                                job_id: JobId(i as u64 + 1),
                                poster,
                                fee_paid: FEE,
                                created_at: i as u64 + 1,
                                occurred_at: Utc::now(),
                            });
                            UncommittedEvent::from_typed(
                                ledger_id.0,
                                AGGREGATE_TYPE,
                                uuid::Uuid::now_v7(),
                                &event,
                            )
                            .unwrap()
                        })
                        .collect();

                    black_box(store.append(events, ExpectedVersion::Any).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_rehydration(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_rehydration");

    for postings in [10usize, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("load_from_stream", postings),
            postings,
            |b, &postings| {
                let portal = deployed_portal(postings);
                let ledger_id = portal.ledger_id();
                b.iter(|| {
                    let ledger: JobLedger = portal
                        .dispatcher()
                        .load(ledger_id.0, |id| JobLedger::empty(LedgerId(id)))
                        .unwrap();
                    black_box(ledger.stats());
                });
            },
        );
    }

    group.finish();
}

fn bench_dispatch_vs_in_place(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_vs_in_place");
    group.sample_size(500);

    let admin = PrincipalId::random();
    let deploy = |ledger_id: LedgerId| {
        LedgerCommand::DeployLedger(DeployLedger {
            ledger_id,
            administrator: admin,
            initial_fee: FEE,
            rules: TransitionRules::default(),
            occurred_at: Utc::now(),
        })
    };
    let post = |ledger_id: LedgerId| {
        LedgerCommand::PostJob(PostJob {
            ledger_id,
            caller: Principal::participant(PrincipalId::random()),
            payment: FEE,
            occurred_at: Utc::now(),
        })
    };

    group.bench_function("dispatcher_deploy_and_post", |b| {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new(), Arc::new(InMemoryBus::new()));
        b.iter(|| {
            let ledger_id = LedgerId::new(AggregateId::new());
            for command in [deploy(ledger_id), post(ledger_id)] {
                dispatcher
                    .dispatch(ledger_id.0, AGGREGATE_TYPE, &command, |id| {
                        JobLedger::empty(LedgerId(id))
                    })
                    .unwrap();
            }
        });
    });

    group.bench_function("in_place_deploy_and_post", |b| {
        b.iter(|| {
            let ledger_id = LedgerId::new(AggregateId::new());
            let mut ledger = JobLedger::empty(ledger_id);
            execute(&mut ledger, &deploy(ledger_id)).unwrap();
            black_box(execute(&mut ledger, &post(ledger_id)).unwrap());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_post_job_latency,
    bench_event_append_throughput,
    bench_rehydration,
    bench_dispatch_vs_in_place
);
criterion_main!(benches);
