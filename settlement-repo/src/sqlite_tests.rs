//! SQLite repository integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use settlement_types::{
        Deposit, DepositStatus, EntryKind, Inquiry, LedgerEntry, Money, Order, OrderStatus,
        PaymentInstructions, PaymentMethod, ProviderStatus, ProviderWebhook, RepoError,
        SettlementRepository, Target, User, UserId, Voucher, WebhookDisposition, WebhookEvent,
    };
    use settlement_types::domain::verify_chain;

    use crate::SqliteRepo;
    use crate::security::{hash_api_key, hash_pin};

    async fn setup_repo() -> SqliteRepo {
        SqliteRepo::new("sqlite::memory:").await.unwrap()
    }

    fn money(v: i64) -> Money {
        Money::new(v).unwrap()
    }

    async fn create_user(repo: &SqliteRepo) -> UserId {
        let id = UserId::new();
        let user = User::new(id, hash_pin(&id.to_string(), "123456"));
        repo.create_user(&user).await.unwrap();
        id
    }

    async fn fund(repo: &SqliteRepo, user_id: UserId, amount: i64) {
        let mut tx = repo.begin().await.unwrap();
        let mut balance = tx.lock_balance(user_id).await.unwrap();
        balance.credit(money(amount)).unwrap();
        tx.persist_balance(&mut balance).await.unwrap();
        tx.commit().await.unwrap();
    }

    fn prepaid_inquiry(user_id: UserId, ttl: Duration) -> Inquiry {
        Inquiry::new(
            user_id,
            Target::Prepaid {
                product_code: "PLN50".into(),
                customer_number: "081234567890".into(),
            },
            money(52_500),
            money(2_500),
            Some("BUDI".into()),
            "INQ-REF-1".into(),
            ttl,
        )
    }

    async fn create_order(repo: &SqliteRepo, user_id: UserId, ttl: Duration) -> Order {
        let inquiry = prepaid_inquiry(user_id, ttl);
        repo.create_inquiry(&inquiry).await.unwrap();
        let order = Order::from_inquiry(&inquiry, Money::ZERO, None).unwrap();
        repo.create_order(&order).await.unwrap();
        order
    }

    #[tokio::test]
    async fn test_create_user_creates_zero_balance() {
        let repo = setup_repo().await;
        let user_id = create_user(&repo).await;

        let balance = repo.get_balance(user_id).await.unwrap().unwrap();
        assert_eq!(balance.amount, Money::ZERO);
        assert_eq!(balance.pending_amount, Money::ZERO);

        let user = repo.get_user(user_id).await.unwrap().unwrap();
        assert_eq!(user.id, user_id);
    }

    #[tokio::test]
    async fn test_get_balance_not_found() {
        let repo = setup_repo().await;
        assert!(repo.get_balance(UserId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lock_balance_missing_row() {
        let repo = setup_repo().await;
        let mut tx = repo.begin().await.unwrap();
        let result = tx.lock_balance(UserId::new()).await;
        assert!(matches!(result, Err(RepoError::NotFound)));
    }

    #[tokio::test]
    async fn test_inquiry_is_scoped_to_user() {
        let repo = setup_repo().await;
        let user_id = create_user(&repo).await;
        let other = create_user(&repo).await;

        let inquiry = prepaid_inquiry(user_id, Duration::minutes(15));
        repo.create_inquiry(&inquiry).await.unwrap();

        let fetched = repo.find_inquiry(user_id, inquiry.id).await.unwrap().unwrap();
        assert_eq!(fetched.target, inquiry.target);
        assert_eq!(fetched.customer_name.as_deref(), Some("BUDI"));
        assert!(repo.find_inquiry(other, inquiry.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_order_for_inquiry_conflicts() {
        let repo = setup_repo().await;
        let user_id = create_user(&repo).await;
        let inquiry = prepaid_inquiry(user_id, Duration::minutes(15));
        repo.create_inquiry(&inquiry).await.unwrap();

        let first = Order::from_inquiry(&inquiry, Money::ZERO, None).unwrap();
        repo.create_order(&first).await.unwrap();

        let second = Order::from_inquiry(&inquiry, Money::ZERO, None).unwrap();
        let result = repo.create_order(&second).await;
        assert!(matches!(result, Err(RepoError::Conflict(_))));

        let found = repo.find_order_by_inquiry(inquiry.id).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn test_shared_reference_is_ambiguous() {
        let repo = setup_repo().await;
        let user_id = create_user(&repo).await;
        let first = create_order(&repo, user_id, Duration::minutes(15)).await;

        let found = repo.find_order_by_reference("INQ-REF-1").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);

        create_order(&repo, user_id, Duration::minutes(15)).await;
        let result = repo.find_order_by_reference("INQ-REF-1").await;
        assert!(matches!(result, Err(RepoError::Conflict(_))));
        assert!(repo.find_order_by_reference("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_debit_unit_of_work_commits() {
        let repo = setup_repo().await;
        let user_id = create_user(&repo).await;
        fund(&repo, user_id, 100_000).await;
        let order = create_order(&repo, user_id, Duration::minutes(15)).await;

        let mut tx = repo.begin().await.unwrap();
        let mut balance = tx.lock_balance(user_id).await.unwrap();
        let mut locked = tx.lock_order(order.id).await.unwrap();
        let before = balance.amount;
        balance.debit(locked.total_payment).unwrap();
        locked.mark_debited(before, balance.amount).unwrap();
        locked
            .succeed(Some("TRX-1".into()), Some("1111-2222".into()))
            .unwrap();
        tx.persist_balance(&mut balance).await.unwrap();
        tx.persist_order(&locked).await.unwrap();
        tx.append_ledger_entry(&LedgerEntry::for_order(
            user_id,
            order.id,
            EntryKind::Debit,
            locked.total_payment,
            before,
            balance.amount,
        ))
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let balance = repo.get_balance(user_id).await.unwrap().unwrap();
        assert_eq!(balance.amount, money(45_000));

        let stored = repo.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Success);
        assert_eq!(stored.balance_after, Some(money(45_000)));
        assert_eq!(stored.serial_number.as_deref(), Some("1111-2222"));

        let by_ref = repo.find_order_by_reference("TRX-1").await.unwrap().unwrap();
        assert_eq!(by_ref.id, order.id);

        let entries = repo.list_ledger_entries(user_id, 10, 0).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::Debit);
        assert!(entries[0].is_consistent());
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_rolls_back() {
        let repo = setup_repo().await;
        let user_id = create_user(&repo).await;
        fund(&repo, user_id, 10_000).await;

        {
            let mut tx = repo.begin().await.unwrap();
            let mut balance = tx.lock_balance(user_id).await.unwrap();
            balance.debit(money(10_000)).unwrap();
            tx.persist_balance(&mut balance).await.unwrap();
        }

        let balance = repo.get_balance(user_id).await.unwrap().unwrap();
        assert_eq!(balance.amount, money(10_000));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_units_of_work_do_not_lose_updates() {
        let repo = Arc::new(setup_repo().await);
        let user_id = create_user(&repo).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let mut tx = repo.begin().await.unwrap();
                let mut balance = tx.lock_balance(user_id).await.unwrap();
                tokio::task::yield_now().await;
                balance.credit(money(1_000)).unwrap();
                tx.persist_balance(&mut balance).await.unwrap();
                tx.commit().await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let balance = repo.get_balance(user_id).await.unwrap().unwrap();
        assert_eq!(balance.amount, money(10_000));
    }

    #[tokio::test]
    async fn test_ledger_chain_is_ordered() {
        let repo = setup_repo().await;
        let user_id = create_user(&repo).await;

        let mut running = Money::ZERO;
        for amount in [10_000, 20_000, 5_000] {
            let deposit = Deposit::new(
                user_id,
                PaymentMethod::Qris,
                money(amount),
                Duration::hours(1),
            );
            repo.create_deposit(&deposit).await.unwrap();

            let mut tx = repo.begin().await.unwrap();
            let mut balance = tx.lock_balance(user_id).await.unwrap();
            let before = balance.amount;
            balance.credit(money(amount)).unwrap();
            tx.persist_balance(&mut balance).await.unwrap();
            tx.append_ledger_entry(&LedgerEntry::for_deposit(
                user_id,
                deposit.id,
                money(amount),
                before,
                balance.amount,
            ))
            .await
            .unwrap();
            tx.commit().await.unwrap();
            running = balance.amount;
        }

        let entries = repo.list_ledger_entries(user_id, 10, 0).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(verify_chain(&entries));
        assert_eq!(entries[2].balance_after, running);
    }

    #[tokio::test]
    async fn test_deposit_lookup_and_expiry_listing() {
        let repo = setup_repo().await;
        let user_id = create_user(&repo).await;

        let mut live = Deposit::new(
            user_id,
            PaymentMethod::VirtualAccount {
                bank_code: "014".into(),
            },
            money(50_000),
            Duration::hours(24),
        );
        live.attach_instructions(PaymentInstructions {
            reference_id: "PAY-LIVE".into(),
            account_number: Some("8808123".into()),
            qr_string: None,
            payment_code: None,
            fee: money(4_000),
            expires_at: None,
        });
        repo.create_deposit(&live).await.unwrap();

        let stale = Deposit::new(user_id, PaymentMethod::Qris, money(10_000), Duration::seconds(-1));
        repo.create_deposit(&stale).await.unwrap();

        let found = repo
            .find_deposit_by_reference("PAY-LIVE")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, live.id);
        assert_eq!(found.instructions, live.instructions);
        assert_eq!(found.fee, money(4_000));

        let expired = repo
            .list_expired_pending_deposits(Utc::now(), 10)
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale.id);

        let mut tx = repo.begin().await.unwrap();
        let mut locked = tx.lock_deposit(stale.id).await.unwrap();
        locked.expire().unwrap();
        tx.persist_deposit(&locked).await.unwrap();
        tx.commit().await.unwrap();

        let stored = repo.get_deposit(stale.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Expired);
        assert!(repo
            .list_expired_pending_deposits(Utc::now(), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_expired_and_stuck_order_listing() {
        let repo = setup_repo().await;
        let user_id = create_user(&repo).await;

        let stale = create_order(&repo, user_id, Duration::seconds(-1)).await;
        let fresh = create_order(&repo, user_id, Duration::minutes(15)).await;

        let expired = repo
            .list_expired_pending_orders(Utc::now(), 10)
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale.id);

        let mut tx = repo.begin().await.unwrap();
        let mut order = tx.lock_order(fresh.id).await.unwrap();
        order.mark_debited(money(100_000), money(45_000)).unwrap();
        tx.persist_order(&order).await.unwrap();
        tx.commit().await.unwrap();

        let stuck = repo
            .list_stuck_processing_orders(Utc::now() + Duration::seconds(1), 10)
            .await
            .unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].id, fresh.id);

        let listed = repo.list_orders(user_id, 10, 0).await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn test_voucher_roundtrip_and_duplicate() {
        let repo = setup_repo().await;
        let voucher = Voucher::new(
            "HEMAT10".into(),
            money(10_000),
            money(50_000),
            Utc::now() + Duration::days(7),
        );
        repo.create_voucher(&voucher).await.unwrap();

        let fetched = repo.find_voucher("HEMAT10").await.unwrap().unwrap();
        assert_eq!(fetched.discount, money(10_000));
        assert!(fetched.is_active);

        let result = repo.create_voucher(&voucher).await;
        assert!(matches!(result, Err(RepoError::Conflict(_))));
        assert!(repo.find_voucher("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_webhook() {
        let repo = setup_repo().await;
        let webhook = ProviderWebhook {
            reference_id: "TRX-9".into(),
            partner_reference_id: None,
            status: ProviderStatus::Success,
            amount: None,
            serial_number: None,
            message: None,
        };
        let event = WebhookEvent::new(
            &webhook,
            serde_json::json!({"reference_id": "TRX-9", "status": "success"}),
            WebhookDisposition::Applied,
        );
        repo.record_webhook(&event).await.unwrap();

        let row: (String, String) = sqlx::query_as(
            "SELECT provider_status, disposition FROM webhook_events WHERE reference_id = 'TRX-9'",
        )
        .fetch_one(repo.pool())
        .await
        .unwrap();
        assert_eq!(row, ("success".to_string(), "applied".to_string()));
    }

    #[tokio::test]
    async fn test_create_api_key() {
        let repo = setup_repo().await;
        assert_eq!(repo.count_api_keys().await.unwrap(), 0);

        let (admin, raw_admin) = repo.create_api_key("admin", None).await.unwrap();
        assert!(raw_admin.starts_with("sk_"));
        assert!(admin.is_admin());

        let user_id = create_user(&repo).await;
        let (_, raw_user) = repo.create_api_key("app", Some(user_id)).await.unwrap();

        let verified = repo
            .verify_api_key_hash(&hash_api_key(&raw_user))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(verified.user_id, Some(user_id));
        assert!(repo
            .verify_api_key_hash(&hash_api_key("sk_wrong"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(repo.count_api_keys().await.unwrap(), 2);
    }
}
