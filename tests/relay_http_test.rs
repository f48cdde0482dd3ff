//! Integration tests for the relay HTTP surface

#[cfg(test)]
mod relay_http_tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde_json::{json, Value};
    use solana_sdk::message::VersionedMessage;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::{Keypair, Signature};
    use solana_sdk::transaction::VersionedTransaction;
    use std::str::FromStr;
    use std::sync::Arc;
    use tower::ServiceExt;

    use splurge_gateway::instructions::{InstructionBuilder, OrderAccounts};
    use splurge_gateway::pda::ProgramAddresses;
    use splurge_gateway::relay::{
        router, InstructionWhitelist, PermissionedRelay, RelaySettings, COARSE_REJECTION,
    };
    use splurge_gateway::rpc_manager::{RetryConfig, RpcManagerError};
    use splurge_gateway::test_utils::MockLedger;
    use splurge_gateway::tx_builder::{BudgetConfig, TxBuilder};
    use splurge_gateway::wallet::AuthorityKeypair;

    struct Fixture {
        ledger: Arc<MockLedger>,
        app: Router,
        admin: Pubkey,
        program: Pubkey,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(MockLedger::new());
        let program = Pubkey::new_unique();
        let authority = AuthorityKeypair::from_keypair(Keypair::new());
        let admin = authority.pubkey();
        let relay = PermissionedRelay::new(
            ledger.clone(),
            InstructionWhitelist::new(program, ["ship_order", "cancel_order"]),
            authority,
            RelaySettings {
                retry: RetryConfig::immediate(2),
                confirmation_timeout_ms: 200,
                poll_interval_ms: 5,
                ..Default::default()
            },
        );
        Fixture {
            ledger,
            app: router(relay, true),
            admin,
            program,
        }
    }

    /// A cancel_order envelope paid for by the admin, as a client would build it
    async fn cancel_envelope(f: &Fixture) -> VersionedTransaction {
        let instructions = InstructionBuilder::new(ProgramAddresses::new(f.program));
        let ix = instructions
            .cancel_order(&OrderAccounts {
                admin: f.admin,
                authority: Pubkey::new_unique(),
                shopper: Pubkey::new_unique(),
                store: Pubkey::new_unique(),
                item: Pubkey::new_unique(),
                order: Pubkey::new_unique(),
                payment_mint: Pubkey::new_unique(),
                token_program: spl_token::id(),
            })
            .unwrap();
        TxBuilder::new(f.ledger.clone(), BudgetConfig::default())
            .estimate_and_assemble(&[ix], &f.admin, &[])
            .await
            .unwrap()
            .into_tx()
    }

    fn encode(tx: &VersionedTransaction) -> String {
        BASE64.encode(bincode::serialize(tx).unwrap())
    }

    async fn post(app: &Router, body: String) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/permissioned")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_cancel_order_is_cosigned_and_submitted() {
        let f = fixture();
        let tx = cancel_envelope(&f).await;
        let message = tx.message.serialize();

        let (status, body) = post(&f.app, json!({ "transaction": encode(&tx) }).to_string()).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["confirmed"], true);

        let sent = f.ledger.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.serialize(), message);
        assert!(sent[0].signatures[0].verify(f.admin.as_ref(), &message));

        let signature = Signature::from_str(body["signature"].as_str().unwrap()).unwrap();
        assert_eq!(signature, sent[0].signatures[0]);
    }

    #[tokio::test]
    async fn test_envelope_alias_is_accepted() {
        let f = fixture();
        let tx = cancel_envelope(&f).await;
        let (status, _) = post(&f.app, json!({ "envelope": encode(&tx) }).to_string()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_single_byte_tamper_of_tag_is_rejected() {
        let f = fixture();
        let mut tx = cancel_envelope(&f).await;
        if let VersionedMessage::V0(message) = &mut tx.message {
            let ix = message.instructions.last_mut().unwrap();
            ix.data[3] ^= 0x01;
        }

        let (status, body) = post(&f.app, json!({ "transaction": encode(&tx) }).to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], COARSE_REJECTION);
        assert_eq!(f.ledger.send_attempts(), 0);
    }

    #[tokio::test]
    async fn test_missing_transaction_field() {
        let f = fixture();
        for body in ["{}", r#"{"transaction": ""}"#, "not json"] {
            let (status, body) = post(&f.app, body.to_string()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Serialized transaction is required.");
        }
        assert_eq!(f.ledger.send_attempts(), 0);
    }

    #[tokio::test]
    async fn test_garbage_envelope_gets_coarse_rejection() {
        let f = fixture();
        let (status, body) = post(
            &f.app,
            json!({ "transaction": BASE64.encode([7u8; 40]) }).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], COARSE_REJECTION);
    }

    #[tokio::test]
    async fn test_ledger_rejection_is_passed_through_verbatim() {
        let f = fixture();
        let ledger_text = "Transaction simulation failed: Error processing Instruction 2: custom program error: 0x1771";
        f.ledger.fail_sends([RpcManagerError::RpcResponse {
            endpoint: "mock".into(),
            message: ledger_text.into(),
            code: Some(-32002),
            logs: vec![],
        }]);
        let tx = cancel_envelope(&f).await;

        let (status, body) = post(&f.app, json!({ "transaction": encode(&tx) }).to_string()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], ledger_text);
        assert_eq!(f.ledger.send_attempts(), 1);
    }

    #[tokio::test]
    async fn test_health_reports_authority_and_whitelist() {
        let f = fixture();
        let response = f
            .app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["authority"], f.admin.to_string());
        assert_eq!(body["allowed_instructions"], json!(["ship_order", "cancel_order"]));
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let f = fixture();
        let response = f
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "req-42");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let f = fixture();
        let response = f
            .app
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("relay_requests_total"));
    }
}
