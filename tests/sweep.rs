//! Reconciliation sweep tests: the escalating timeout table, live-status
//! reconciliation through a stubbed provider, and error accounting.

mod common;

use std::time::Duration;

use common::*;
use fondo::reconcile::{run_sweep, SweepPolicy};
use fondo::transition;

const MINUTE: i64 = 60;
const HOUR: i64 = 3600;

fn test_policy() -> SweepPolicy {
    SweepPolicy {
        abandonment_window_secs: 30 * MINUTE,
        reference_timeout_secs: 6 * HOUR,
        hard_timeout_secs: 24 * HOUR,
        pacing: Duration::from_millis(0),
    }
}

fn status_of(pool: &DbPool, id: &str) -> PurchaseStatus {
    let conn = pool.get().unwrap();
    queries::get_purchase_by_id(&conn, id).unwrap().unwrap().status
}

fn confirm(pool: &DbPool, id: &str, tx_id: &str) {
    let conn = pool.get().unwrap();
    queries::confirm_provider_transaction(&conn, id, tx_id).unwrap();
}

#[tokio::test]
async fn test_abandoned_purchase_is_cancelled_after_window() {
    // Scenario: purchase created, no provider callback ever arrives; the
    // sweep 31 minutes later cancels it.
    let (_dir, pool) = setup_test_pool();
    let purchase = {
        let conn = pool.get().unwrap();
        let p = create_test_purchase(&conn, Provider::Wompi, "FND-20-a", &[1]);
        backdate_purchase(&conn, &p.id, 31 * MINUTE);
        p
    };

    let summary = run_sweep(&pool, &StubStatusSource::new(), &test_policy())
        .await
        .unwrap();

    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.transitioned, 1);
    assert!(summary.errors.is_empty());
    assert_eq!(status_of(&pool, &purchase.id), PurchaseStatus::Cancelled);
}

#[tokio::test]
async fn test_fresh_purchase_is_left_alone() {
    let (_dir, pool) = setup_test_pool();
    let purchase = {
        let conn = pool.get().unwrap();
        let p = create_test_purchase(&conn, Provider::Wompi, "FND-20-b", &[2]);
        backdate_purchase(&conn, &p.id, 5 * MINUTE);
        p
    };

    let summary = run_sweep(&pool, &StubStatusSource::new(), &test_policy())
        .await
        .unwrap();

    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.transitioned, 0);
    assert_eq!(status_of(&pool, &purchase.id), PurchaseStatus::Pending);
}

#[tokio::test]
async fn test_unconfirmed_handle_uses_reference_timeout() {
    let (_dir, pool) = setup_test_pool();
    let (young, old) = {
        let conn = pool.get().unwrap();
        let young = create_test_purchase(&conn, Provider::MercadoPago, "FND-20-c", &[3]);
        record_unconfirmed_handle(&conn, &young.id, "pref-111");
        backdate_purchase(&conn, &young.id, 5 * HOUR);

        let old = create_test_purchase(&conn, Provider::MercadoPago, "FND-20-d", &[4]);
        record_unconfirmed_handle(&conn, &old.id, "pref-222");
        backdate_purchase(&conn, &old.id, 7 * HOUR);
        (young, old)
    };

    // The handle is not a transaction id, so the stub must never be asked
    let summary = run_sweep(&pool, &StubStatusSource::new(), &test_policy())
        .await
        .unwrap();

    assert_eq!(summary.transitioned, 1);
    assert_eq!(status_of(&pool, &young.id), PurchaseStatus::Pending);
    assert_eq!(status_of(&pool, &old.id), PurchaseStatus::Cancelled);
}

#[tokio::test]
async fn test_confirmed_purchase_follows_live_status() {
    let (_dir, pool) = setup_test_pool();
    let (approved, declined, still_pending) = {
        let conn = pool.get().unwrap();
        let a = create_test_purchase(&conn, Provider::Wompi, "FND-20-e", &[5]);
        let d = create_test_purchase(&conn, Provider::Wompi, "FND-20-f", &[6]);
        let p = create_test_purchase(&conn, Provider::MercadoPago, "FND-20-g", &[7]);
        (a, d, p)
    };
    confirm(&pool, &approved.id, "15113-1-100");
    confirm(&pool, &declined.id, "15113-1-200");
    confirm(&pool, &still_pending.id, "300");

    let stub = StubStatusSource::new()
        .with("15113-1-100", StubResponse::Status("APPROVED"))
        .with("15113-1-200", StubResponse::Status("DECLINED"))
        .with("300", StubResponse::Status("in_process"));

    let summary = run_sweep(&pool, &stub, &test_policy()).await.unwrap();

    assert_eq!(summary.scanned, 3);
    assert_eq!(summary.transitioned, 2);
    assert_eq!(status_of(&pool, &approved.id), PurchaseStatus::Approved);
    assert_eq!(status_of(&pool, &declined.id), PurchaseStatus::Rejected);
    assert_eq!(status_of(&pool, &still_pending.id), PurchaseStatus::Pending);
}

#[tokio::test]
async fn test_provider_outage_respects_hard_timeout() {
    // Scenario: the provider query fails across runs spanning 25 hours;
    // only the run crossing the 24 h boundary cancels.
    let (_dir, pool) = setup_test_pool();
    let purchase = {
        let conn = pool.get().unwrap();
        create_test_purchase(&conn, Provider::Wompi, "FND-20-h", &[8])
    };
    confirm(&pool, &purchase.id, "15113-1-300");

    let stub = StubStatusSource::new().with("15113-1-300", StubResponse::Unavailable);

    // 10 hours in: still inside the hard timeout, stays pending
    {
        let conn = pool.get().unwrap();
        backdate_purchase(&conn, &purchase.id, 10 * HOUR);
    }
    let summary = run_sweep(&pool, &stub, &test_policy()).await.unwrap();
    assert_eq!(summary.transitioned, 0);
    assert!(summary.errors.is_empty());
    assert_eq!(status_of(&pool, &purchase.id), PurchaseStatus::Pending);

    // 25 hours in: the status was never retrieved, cancel anyway
    {
        let conn = pool.get().unwrap();
        backdate_purchase(&conn, &purchase.id, 15 * HOUR);
    }
    let summary = run_sweep(&pool, &stub, &test_policy()).await.unwrap();
    assert_eq!(summary.transitioned, 1);
    assert_eq!(status_of(&pool, &purchase.id), PurchaseStatus::Cancelled);
}

#[tokio::test]
async fn test_not_found_and_rate_limit_are_treated_as_unreachable() {
    let (_dir, pool) = setup_test_pool();
    let (missing, throttled) = {
        let conn = pool.get().unwrap();
        let m = create_test_purchase(&conn, Provider::Wompi, "FND-20-i", &[9]);
        let t = create_test_purchase(&conn, Provider::Wompi, "FND-20-j", &[10]);
        (m, t)
    };
    confirm(&pool, &missing.id, "15113-1-400");
    confirm(&pool, &throttled.id, "15113-1-500");
    {
        let conn = pool.get().unwrap();
        backdate_purchase(&conn, &missing.id, 25 * HOUR);
        backdate_purchase(&conn, &throttled.id, 2 * HOUR);
    }

    let stub = StubStatusSource::new()
        .with("15113-1-400", StubResponse::NotFound)
        .with("15113-1-500", StubResponse::RateLimited);

    let summary = run_sweep(&pool, &stub, &test_policy()).await.unwrap();

    assert!(summary.errors.is_empty());
    // Past the hard timeout with no provider answer: cancelled
    assert_eq!(status_of(&pool, &missing.id), PurchaseStatus::Cancelled);
    // Throttled but young: wait for the next run
    assert_eq!(status_of(&pool, &throttled.id), PurchaseStatus::Pending);
}

#[tokio::test]
async fn test_sweep_never_touches_terminal_purchases() {
    // Scenario: a webhook already completed the purchase; a later sweep
    // leaves it untouched and does not even scan it.
    let (_dir, pool) = setup_test_pool();
    let purchase = {
        let conn = pool.get().unwrap();
        let p = create_test_purchase(&conn, Provider::Wompi, "FND-20-k", &[11]);
        let outcome = transition::apply(&conn, &p, PurchaseStatus::Approved).unwrap();
        assert!(outcome.did_transition());
        backdate_purchase(&conn, &p.id, 48 * HOUR);
        p
    };

    let summary = run_sweep(&pool, &StubStatusSource::new(), &test_policy())
        .await
        .unwrap();

    assert_eq!(summary.scanned, 0);
    assert_eq!(status_of(&pool, &purchase.id), PurchaseStatus::Approved);
}

#[tokio::test]
async fn test_unexpected_errors_do_not_abort_the_run() {
    let (_dir, pool) = setup_test_pool();
    let (broken, fine) = {
        let conn = pool.get().unwrap();
        let b = create_test_purchase(&conn, Provider::Wompi, "FND-20-l", &[12]);
        let f = create_test_purchase(&conn, Provider::Wompi, "FND-20-m", &[13]);
        // broken is older, so it is swept first and its failure must not
        // stop the run
        backdate_purchase(&conn, &b.id, 10 * MINUTE);
        (b, f)
    };
    confirm(&pool, &broken.id, "15113-1-600");
    confirm(&pool, &fine.id, "15113-1-700");

    let stub = StubStatusSource::new()
        .with("15113-1-600", StubResponse::Malformed)
        .with("15113-1-700", StubResponse::Status("APPROVED"));

    let summary = run_sweep(&pool, &stub, &test_policy()).await.unwrap();

    assert_eq!(summary.scanned, 2);
    assert_eq!(summary.transitioned, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].purchase_id, broken.id);
    assert_eq!(status_of(&pool, &broken.id), PurchaseStatus::Pending);
    assert_eq!(status_of(&pool, &fine.id), PurchaseStatus::Approved);
}

#[tokio::test]
async fn test_timeout_monotonicity() {
    // A pending purchase older than its applicable timeout and unconfirmed
    // by the provider always leaves PENDING on the next sweep.
    let (_dir, pool) = setup_test_pool();
    let ids: Vec<String> = {
        let conn = pool.get().unwrap();
        let no_handle = create_test_purchase(&conn, Provider::Wompi, "FND-20-n", &[14]);
        backdate_purchase(&conn, &no_handle.id, 31 * MINUTE);

        let handle_only = create_test_purchase(&conn, Provider::MercadoPago, "FND-20-o", &[15]);
        record_unconfirmed_handle(&conn, &handle_only.id, "pref-333");
        backdate_purchase(&conn, &handle_only.id, 7 * HOUR);

        let unreachable = create_test_purchase(&conn, Provider::Wompi, "FND-20-p", &[16]);
        backdate_purchase(&conn, &unreachable.id, 25 * HOUR);
        vec![no_handle.id, handle_only.id, unreachable.id]
    };
    confirm(&pool, &ids[2], "15113-1-800");

    let stub = StubStatusSource::new().with("15113-1-800", StubResponse::Unavailable);
    let summary = run_sweep(&pool, &stub, &test_policy()).await.unwrap();

    assert_eq!(summary.transitioned, 3);
    for id in &ids {
        assert_eq!(status_of(&pool, id), PurchaseStatus::Cancelled);
    }
}
