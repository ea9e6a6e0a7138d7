/// Batch pipeline tests
/// Verification, enrichment, dedup, ranking and persistence with in-process fakes
mod common;

use common::{
    contact_page, fast_settings, lead, registry_record, today, Collaborators, FakeDirectory,
    FakeFetcher, FakeGenerator, FakeRecords, FakeSearch, MemoryStore,
};
use rust_lead_finder::errors::AppError;
use rust_lead_finder::models::{BlacklistSet, BusinessIdentity, LeadSource, LeadStatus};
use rust_lead_finder::pipeline::{filter_new, PipelineSettings};
use rust_lead_finder::providers::{LeadStore, RecordSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::task::TaskTracker;

fn no_external_calls() -> PipelineSettings {
    PipelineSettings {
        verify_websites: false,
        enrich_emails: false,
        ..fast_settings()
    }
}

// ============ Website verification ============

#[tokio::test]
async fn test_catalog_only_results_and_dead_probes_mean_no_website() {
    let collaborators = Collaborators {
        search: Some(Arc::new(FakeSearch::returning(&[
            "https://www.gulesider.no/asker-ror/12345",
            "https://www.facebook.com/askerror",
            "https://www.proff.no/selskap/asker-ror-as",
        ]))),
        ..Collaborators::offline()
    };

    let identity = BusinessIdentity::new("Asker Rør", "Asker");
    assert!(collaborators.verifier().has_no_website(&identity).await);
}

#[tokio::test]
async fn test_own_domain_in_results_means_website() {
    let collaborators = Collaborators {
        search: Some(Arc::new(FakeSearch::returning(&[
            "https://www.gulesider.no/asker-bil/12345",
            "https://www.askerbil.no/",
        ]))),
        ..Collaborators::offline()
    };

    let identity = BusinessIdentity::new("Asker Bil", "Asker");
    assert!(!collaborators.verifier().has_no_website(&identity).await);
}

#[tokio::test]
async fn test_non_ascii_letters_are_dropped_from_name_token() {
    // "Asker Rør" normalizes to "askerrr", which "askerror.no" does not contain
    let collaborators = Collaborators {
        search: Some(Arc::new(FakeSearch::returning(&["https://www.askerror.no/"]))),
        ..Collaborators::offline()
    };

    let identity = BusinessIdentity::new("Asker Rør", "Asker");
    assert!(collaborators.verifier().has_no_website(&identity).await);
}

#[tokio::test]
async fn test_overlong_name_is_not_probed() {
    let name = "Asker og Baerum Roerleggerservice og Varmepumpeinstallasjon Totalentreprise AS";
    let slug = rust_lead_finder::normalize(name);
    assert!(slug.len() > 63);

    let collaborators = Collaborators {
        fetcher: Arc::new(
            FakeFetcher::new()
                .with_head(&format!("https://www.{}.no", slug), 200)
                .with_head(&format!("https://www.{}.com", slug), 200),
        ),
        ..Collaborators::offline()
    };
    let verifier = collaborators.verifier();
    let identity = BusinessIdentity::new(name, "Asker");

    assert!(verifier.probe_urls(&identity).is_empty());
    assert!(verifier.has_no_website(&identity).await);
}

#[tokio::test]
async fn test_domain_guess_that_answers_means_website() {
    let collaborators = Collaborators {
        fetcher: Arc::new(FakeFetcher::new().with_head("https://www.askerbil.com", 301)),
        ..Collaborators::offline()
    };
    let verifier = collaborators.verifier();
    let identity = BusinessIdentity::new("Asker Bil", "Asker");

    assert_eq!(
        verifier.probe_urls(&identity),
        vec!["https://www.askerbil.no", "https://www.askerbil.com"]
    );
    assert!(!verifier.has_no_website(&identity).await);
}

#[tokio::test]
async fn test_domain_guess_answering_404_is_no_evidence() {
    let collaborators = Collaborators {
        fetcher: Arc::new(
            FakeFetcher::new()
                .with_head("https://www.askerbil.no", 404)
                .with_head("https://www.askerbil.com", 410),
        ),
        ..Collaborators::offline()
    };
    let identity = BusinessIdentity::new("Asker Bil", "Asker");
    assert!(collaborators.verifier().has_no_website(&identity).await);
}

#[tokio::test]
async fn test_business_with_website_is_dropped_from_batch() {
    let collaborators = Collaborators {
        fetcher: Arc::new(FakeFetcher::new().with_head("https://www.askerbil.no", 200)),
        ..Collaborators::offline()
    };
    let pipeline = collaborators.pipeline(
        None,
        PipelineSettings {
            enrich_emails: false,
            ..fast_settings()
        },
    );

    let report = pipeline
        .run_batch(vec![
            registry_record("1", "Asker Bil", "ASKER"),
            registry_record("2", "Bærum Flis", "BÆRUM"),
        ])
        .await
        .unwrap();

    assert_eq!(report.len(), 1);
    assert_eq!(report[0].id, "2");
    assert!(!report[0].has_website);
}

// ============ Ranking ============

#[tokio::test]
async fn test_batch_output_is_capped_and_ranked_stably() {
    let records = (0..25)
        .map(|i| {
            let locale = match i % 3 {
                0 => "ASKER",
                1 => "BÆRUM",
                _ => "OSLO",
            };
            registry_record(&format!("org-{:02}", i), &format!("Firma {}", i), locale)
        })
        .collect();

    let pipeline = Collaborators::offline().pipeline(None, no_external_calls());
    let leads = pipeline.run_batch(records).await.unwrap();

    assert_eq!(leads.len(), 20);
    // 40 contact + 20 Asker / 15 Bærum / 0 elsewhere
    assert_eq!(leads[0].potential_score, 60);
    assert_eq!(leads[0].id, "org-00");
    for pair in leads.windows(2) {
        assert!(pair[0].potential_score >= pair[1].potential_score);
        if pair[0].potential_score == pair[1].potential_score {
            assert!(pair[0].id < pair[1].id, "ties keep input order");
        }
    }
    assert_eq!(leads.iter().filter(|l| l.potential_score == 60).count(), 9);
    assert_eq!(leads.iter().filter(|l| l.potential_score == 55).count(), 8);
    assert_eq!(leads.iter().filter(|l| l.potential_score == 40).count(), 3);
}

// ============ Enrichment ============

#[tokio::test]
async fn test_rate_limited_model_gives_up_and_batch_continues() {
    let generator = Arc::new(FakeGenerator::rate_limited());
    let collaborators = Collaborators {
        search: Some(Arc::new(FakeSearch::returning(&[
            "https://firmaoversikten.no/side/1",
        ]))),
        fetcher: Arc::new(
            FakeFetcher::new()
                .with_page("https://firmaoversikten.no/side/1", &contact_page("Ring oss")),
        ),
        generator: Some(generator.clone()),
        ..Collaborators::offline()
    };
    let pipeline = collaborators.pipeline(None, fast_settings());

    let leads = pipeline
        .run_batch(vec![
            registry_record("1", "Asker Maling", "ASKER"),
            registry_record("2", "Bærum Maling", "BÆRUM"),
        ])
        .await
        .unwrap();

    assert_eq!(leads.len(), 2);
    assert!(leads.iter().all(|l| l.email.is_none()));
    // three attempts per identity, then the tier gives up
    assert_eq!(generator.calls(), 6);
}

#[tokio::test]
async fn test_found_email_raises_score_and_is_counted() {
    let directory = Arc::new(FakeDirectory::with_markup(
        "1881.no",
        r#"<a href="mailto:post@askermaling.no">post@askermaling.no</a>"#,
    ));
    let collaborators = Collaborators {
        directories: vec![directory.clone()],
        ..Collaborators::offline()
    };
    let pipeline = collaborators.pipeline(
        None,
        PipelineSettings {
            verify_websites: false,
            ..fast_settings()
        },
    );

    let (_tx, cancel) = watch::channel(false);
    let report = pipeline
        .run(vec![registry_record("1", "Asker Maling", "ASKER")], cancel)
        .await
        .unwrap();

    assert_eq!(report.stats.emails_found, 1);
    let lead = &report.leads[0];
    assert_eq!(lead.email.as_deref(), Some("post@askermaling.no"));
    // 40 contact + 20 email + 20 Asker
    assert_eq!(lead.potential_score, 80);
    assert_eq!(lead.status, LeadStatus::Pending);
}

#[tokio::test]
async fn test_registry_email_skips_the_cascade() {
    let directory = Arc::new(FakeDirectory::with_markup(
        "proff.no",
        r#"<a href="mailto:annen@askermaling.no">x</a>"#,
    ));
    let collaborators = Collaborators {
        directories: vec![directory.clone()],
        ..Collaborators::offline()
    };
    let pipeline = collaborators.pipeline(
        None,
        PipelineSettings {
            verify_websites: false,
            ..fast_settings()
        },
    );

    let mut record = registry_record("1", "Asker Maling", "ASKER");
    record.email = Some(" Post@AskerMaling.no ".to_string());
    let (_tx, cancel) = watch::channel(false);
    let report = pipeline.run(vec![record], cancel).await.unwrap();

    assert_eq!(report.leads[0].email.as_deref(), Some("post@askermaling.no"));
    assert_eq!(report.stats.emails_found, 0);
    assert_eq!(directory.lookups(), 0);
}

// ============ Dedup and persistence ============

#[tokio::test]
async fn test_known_and_repeated_ids_are_skipped() {
    let store = Arc::new(MemoryStore::with_ids(&["known"]));
    let pipeline = Collaborators::offline().pipeline(Some(store.clone()), no_external_calls());

    let (_tx, cancel) = watch::channel(false);
    let report = pipeline
        .run(
            vec![
                registry_record("known", "Gammel Firma", "ASKER"),
                registry_record("new", "Ny Firma", "ASKER"),
                registry_record("new", "Ny Firma", "ASKER"),
            ],
            cancel,
        )
        .await
        .unwrap();

    assert_eq!(report.stats.received, 3);
    assert_eq!(report.stats.skipped_known, 2);
    assert_eq!(report.stats.processed, 1);
    assert_eq!(report.stats.persisted, 1);
    assert_eq!(report.leads.len(), 1);
    assert_eq!(store.len(), 2);
    assert_eq!(store.get("new").unwrap().status, LeadStatus::Pending);
}

#[tokio::test]
async fn test_reviewed_lead_survives_a_rerun() {
    let store = Arc::new(MemoryStore::default());
    let pipeline = Collaborators::offline().pipeline(Some(store.clone()), no_external_calls());

    pipeline
        .run_batch(vec![registry_record("1", "Asker Maling", "ASKER")])
        .await
        .unwrap();
    store
        .set_status("1", LeadStatus::Accepted, Some("Ringt, vil ha tilbud"))
        .await
        .unwrap();

    store.upsert(&[lead("1", 10, 0)]).await.unwrap();

    let stored = store.get("1").unwrap();
    assert_eq!(stored.status, LeadStatus::Accepted);
    assert_eq!(stored.notes, "Ringt, vil ha tilbud");
    assert_eq!(stored.potential_score, 60);
}

#[tokio::test]
async fn test_unreadable_store_degrades_without_persisting() {
    let store = Arc::new(MemoryStore::unreadable());
    let pipeline = Collaborators::offline().pipeline(Some(store.clone()), no_external_calls());

    let (_tx, cancel) = watch::channel(false);
    let report = pipeline
        .run(vec![registry_record("1", "Asker Maling", "ASKER")], cancel)
        .await
        .unwrap();

    assert!(report.stats.store_degraded);
    assert_eq!(report.leads.len(), 1);
    assert_eq!(report.stats.persisted, 0);
    assert_eq!(store.upsert_calls(), 0);
}

#[tokio::test]
async fn test_failed_write_keeps_results() {
    let store = Arc::new(MemoryStore::unwritable());
    let pipeline = Collaborators::offline().pipeline(Some(store.clone()), no_external_calls());

    let (_tx, cancel) = watch::channel(false);
    let report = pipeline
        .run(vec![registry_record("1", "Asker Maling", "ASKER")], cancel)
        .await
        .unwrap();

    assert_eq!(report.leads.len(), 1);
    assert!(report.stats.store_degraded);
    assert_eq!(report.stats.persisted, 0);
}

#[tokio::test]
async fn test_required_store_missing_fails_before_processing() {
    let search = Arc::new(FakeSearch::returning(&[]));
    let collaborators = Collaborators {
        search: Some(search.clone()),
        ..Collaborators::offline()
    };
    let pipeline = collaborators.pipeline(
        None,
        PipelineSettings {
            require_store: true,
            ..fast_settings()
        },
    );

    assert!(matches!(
        pipeline.ensure_store(),
        Err(AppError::ConfigurationMissing(_))
    ));
    let result = pipeline
        .run_batch(vec![registry_record("1", "Asker Maling", "ASKER")])
        .await;
    assert!(matches!(result, Err(AppError::ConfigurationMissing(_))));
    assert_eq!(search.calls(), 0);
}

// ============ Interruption ============

#[tokio::test]
async fn test_cancel_keeps_and_persists_partial_results() {
    let store = Arc::new(MemoryStore::default());
    let pipeline = Collaborators::offline().pipeline(
        Some(store.clone()),
        PipelineSettings {
            identity_delay: Duration::from_millis(200),
            ..no_external_calls()
        },
    );
    let records = (0..5)
        .map(|i| registry_record(&format!("{}", i), &format!("Firma {}", i), "ASKER"))
        .collect();

    let (tx, cancel) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send_replace(true);
    });

    let report = pipeline.run(records, cancel).await.unwrap();

    assert!(report.stats.interrupted);
    assert_eq!(report.leads.len(), 2);
    assert_eq!(report.stats.persisted, 2);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_tracked_background_batch_persists_before_shutdown_completes() {
    let store = Arc::new(MemoryStore::default());
    let pipeline = Collaborators::offline().pipeline(
        Some(store.clone()),
        PipelineSettings {
            identity_delay: Duration::from_millis(200),
            ..no_external_calls()
        },
    );
    let records: Vec<_> = (0..5)
        .map(|i| registry_record(&format!("{}", i), &format!("Firma {}", i), "ASKER"))
        .collect();

    let (shutdown, cancel) = watch::channel(false);
    let batches = TaskTracker::new();
    batches.spawn(async move {
        pipeline.run(records, cancel).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.send_replace(true);
    batches.close();
    batches.wait().await;

    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_elapsed_deadline_stops_before_first_identity() {
    let pipeline = Collaborators::offline().pipeline(
        None,
        PipelineSettings {
            run_timeout: Some(Duration::ZERO),
            ..no_external_calls()
        },
    );

    let (_tx, cancel) = watch::channel(false);
    let report = pipeline
        .run(vec![registry_record("1", "Asker Maling", "ASKER")], cancel)
        .await
        .unwrap();

    assert!(report.stats.interrupted);
    assert_eq!(report.stats.processed, 0);
    assert!(report.leads.is_empty());
}

// ============ Import helpers ============

#[test]
fn test_filter_new_skips_known_blank_and_repeated_ids() {
    let mut known = BlacklistSet::new();
    known.insert("y");

    let (fresh, skipped) = filter_new(
        vec![lead("x", 50, 0), lead("", 50, 0), lead("y", 50, 0), lead("x", 40, 0)],
        &mut known,
    );

    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].id, "x");
    assert_eq!(fresh[0].potential_score, 50);
    assert_eq!(skipped, 3);
    assert!(known.contains("x"));
}

#[tokio::test]
async fn test_places_records_use_ratings_score() {
    let mut record = registry_record("place-1", "Kafé Torget", "Asker");
    record.source = LeadSource::PlacesApi;
    record.rating = Some(5.0);
    record.review_count = Some(99);

    let source = FakeRecords(vec![record]);
    let records = source.fetch_records(today()).await.unwrap();
    let pipeline = Collaborators::offline().pipeline(None, no_external_calls());
    let leads = pipeline.run_batch(records).await.unwrap();

    assert_eq!(leads[0].source, LeadSource::PlacesApi);
    assert_eq!(leads[0].user_rating_count, 99);
    assert_eq!(leads[0].potential_score, 100);
}
