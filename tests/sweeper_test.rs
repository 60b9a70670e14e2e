use adsettle::domain::{
    Ad, AdId, Category, CategoryId, Money, OwnerType, PlacementStatus, TimeMs, TxnKind, UserId,
    WebsiteId,
};
use adsettle::engine::ledger::{self, EntryMeta};
use adsettle::engine::rejection::RejectionPolicy;
use adsettle::gateway::MockGateway;
use adsettle::{
    init_db, Config, DeadlineSweeper, PlacementId, Repository, SelectionRequest,
    SettlementCoordinator, SettlementError,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn m(s: &str) -> Money {
    Money::from_str_canonical(s).unwrap()
}

fn test_config(db_path: String, rejection_window_ms: i64, grace_period_ms: i64) -> Config {
    Config {
        database_path: db_path,
        gateway_api_url: "http://example.invalid".to_string(),
        gateway_secret: "sk_test_secret".to_string(),
        rejection_window_ms,
        grace_period_ms,
        sweep_interval_ms: 60_000,
        txn_retry_budget_ms: 2_000,
    }
}

struct TestEnv {
    repo: Arc<Repository>,
    coordinator: SettlementCoordinator,
    sweeper: DeadlineSweeper,
    advertiser: UserId,
    publisher: UserId,
    ad: AdId,
    website: WebsiteId,
    category: CategoryId,
    _temp: TempDir,
}

async fn setup(rejection_window_ms: i64, grace_period_ms: i64) -> TestEnv {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let gateway = Arc::new(MockGateway::new());
    let config = test_config(db_path, rejection_window_ms, grace_period_ms);
    let coordinator = SettlementCoordinator::new(repo.clone(), gateway, &config);
    let sweeper = DeadlineSweeper::new(
        repo.clone(),
        RejectionPolicy::from_config(&config),
        config.sweep_interval_ms,
        config.txn_retry_budget_ms,
    );

    let advertiser = UserId::generate();
    let publisher = UserId::generate();
    let ad = AdId::generate();
    let website = WebsiteId::generate();
    let category = CategoryId::generate();

    let mut conn = repo.pool().acquire().await.unwrap();
    repo.insert_ad(
        &mut conn,
        &Ad {
            id: ad,
            advertiser_id: advertiser,
            confirmed: false,
            available_for_reassignment: false,
        },
    )
    .await
    .unwrap();
    repo.insert_category(
        &mut conn,
        &Category {
            id: category,
            website_id: website,
            owner_id: publisher,
            price: m("30"),
            capacity: 5,
        },
    )
    .await
    .unwrap();
    let wallet = repo
        .get_or_create_wallet(&mut conn, advertiser, OwnerType::Advertiser)
        .await
        .unwrap();
    ledger::credit(
        &repo,
        &mut conn,
        wallet,
        m("30"),
        TxnKind::Credit,
        EntryMeta {
            payment_id: None,
            ad_id: None,
            at: TimeMs::now(),
        },
    )
    .await
    .unwrap();
    drop(conn);

    TestEnv {
        repo,
        coordinator,
        sweeper,
        advertiser,
        publisher,
        ad,
        website,
        category,
        _temp: temp_dir,
    }
}

/// Settle one wallet-funded placement and return its id.
async fn settled_placement(env: &TestEnv) -> PlacementId {
    let receipt = env
        .coordinator
        .initiate_checkout(
            env.advertiser,
            env.ad,
            &[SelectionRequest {
                website_id: env.website,
                category_id: env.category,
            }],
            false,
        )
        .await
        .unwrap();
    receipt.payments[0].placement_id
}

#[tokio::test]
async fn test_sweeper_revokes_expired_rejectability() {
    let env = setup(1, 0).await;
    let placement_id = settled_placement(&env).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let swept = env.sweeper.sweep_once().await.unwrap();
    assert_eq!(swept, 1);

    // The placement stays active; only rejectability is gone.
    let placement = env.repo.find_placement(placement_id).await.unwrap().unwrap();
    assert_eq!(placement.status, PlacementStatus::Active);
    assert!(!placement.is_rejectable);

    let err = env
        .coordinator
        .reject_placement(env.publisher, placement_id, "too late")
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::StateConflict(_)));
}

#[tokio::test]
async fn test_sweeper_ignores_live_windows() {
    let env = setup(24 * 60 * 60 * 1000, 5 * 60 * 1000).await;
    let placement_id = settled_placement(&env).await;

    let swept = env.sweeper.sweep_once().await.unwrap();
    assert_eq!(swept, 0);

    let placement = env.repo.find_placement(placement_id).await.unwrap().unwrap();
    assert!(placement.is_rejectable);
}

#[tokio::test]
async fn test_sweep_cutoff_matches_rejection_grace() {
    let grace_ms = 5 * 60 * 1000;
    let env = setup(60 * 60 * 1000, grace_ms).await;
    let placement_id = settled_placement(&env).await;

    let placement = env.repo.find_placement(placement_id).await.unwrap().unwrap();
    let deadline = placement.rejection_deadline.unwrap();

    // Exactly at deadline + grace the rejection is still accepted, so the
    // sweeper must not act yet.
    let swept = env
        .sweeper
        .sweep_once_at(deadline.plus_ms(grace_ms))
        .await
        .unwrap();
    assert_eq!(swept, 0);

    let swept = env
        .sweeper
        .sweep_once_at(deadline.plus_ms(grace_ms + 1))
        .await
        .unwrap();
    assert_eq!(swept, 1);

    let placement = env.repo.find_placement(placement_id).await.unwrap().unwrap();
    assert!(!placement.is_rejectable);
}

#[tokio::test]
async fn test_sweep_is_idempotent() {
    let env = setup(1, 0).await;
    settled_placement(&env).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(env.sweeper.sweep_once().await.unwrap(), 1);
    assert_eq!(env.sweeper.sweep_once().await.unwrap(), 0);
}
