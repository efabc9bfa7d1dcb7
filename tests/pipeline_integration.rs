//! End-to-end workflow test: upload, notify, reply, resolve.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use remedia::channels::{EmailSender, MessagingSender};
use remedia::correlation;
use remedia::dispatch::MessageQueue;
use remedia::error::ChannelError;
use remedia::pipeline::{BatchOutcome, BatchProcessor, UploadRow};
use remedia::state::RemediationState;
use remedia::store::schema::columns;
use remedia::store::{LibSqlBackend, SheetService};

struct RecordingEmail {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send(&self, to: &str, _subject: &str, body: &str) -> Result<String, ChannelError> {
        self.sent.lock().unwrap().push((to.into(), body.into()));
        Ok("transport-id".into())
    }
}

struct RecordingMessaging {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl MessagingSender for RecordingMessaging {
    async fn send(&self, to: &str, body: &str) -> Result<bool, ChannelError> {
        self.sent.lock().unwrap().push((to.into(), body.into()));
        Ok(true)
    }
}

fn upload_rows() -> Vec<UploadRow> {
    serde_json::from_value(serde_json::json!([
        {
            "Fecha": "01/02/2025 09:15:00",
            "Concepto": "Transferencia recibida",
            "N° Movimiento": "1001",
            "Referencia": "REF-11",
            "Monto": "2.500,00",
            "QUERY": 2,
            "CORREO": "cliente@example.com",
            "REMITENTE": "Banco Sur"
        },
        {
            "Fecha": "01/02/2025 09:20:00",
            "Concepto": "Pago PSE",
            "N° Movimiento": "1002",
            "Referencia": "REF-12",
            "Monto": "890,50",
            "QUERY": 3,
            "TELEFONO": "'573178965432",
            "REMITENTE": "Banco Sur"
        },
        {
            "Fecha": "01/02/2025 09:25:00",
            "Concepto": "Consignación",
            "N° Movimiento": "1003",
            "Referencia": "REF-13",
            "Monto": "120,00",
            "QUERY": 7,
            "REMITENTE": "Banco Sur"
        }
    ]))
    .unwrap()
}

#[tokio::test]
async fn upload_notify_reply_resolve() {
    let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let store = SheetService::open(backend).await.unwrap();

    let email = Arc::new(RecordingEmail {
        sent: Mutex::new(Vec::new()),
    });
    let messaging = Arc::new(RecordingMessaging {
        sent: Mutex::new(Vec::new()),
    });
    let queue = MessageQueue::spawn_with(
        Arc::clone(&messaging) as Arc<dyn MessagingSender>,
        3,
        Duration::from_millis(1),
    );
    let processor = BatchProcessor::new(
        Arc::clone(&store),
        Arc::clone(&email) as Arc<dyn EmailSender>,
        Arc::clone(&queue),
    );

    // ── Upload ───────────────────────────────────────────────────────
    let outcome = processor
        .process_batch(upload_rows(), Some("extracto_feb.xlsx"))
        .await
        .unwrap();
    let BatchOutcome::Completed { summary } = outcome else {
        panic!("expected a completed batch");
    };
    assert_eq!(summary.total_new, 3);
    assert_eq!(summary.protocol_a_count, 1);
    assert_eq!(summary.protocol_b_count, 1);
    assert_eq!(summary.unclassified_count, 1);
    assert!(summary.persisted);

    // ── Notices carry correlation tokens, never movement numbers ─────
    queue.drain_and_wait().await;

    let email_sent = email.sent.lock().unwrap();
    assert_eq!(email_sent.len(), 1);
    assert_eq!(email_sent[0].0, "cliente@example.com");
    let email_token = correlation::extract(&email_sent[0].1).expect("email notice carries a token");
    assert!(!email_sent[0].1.contains("1001"));
    drop(email_sent);

    let wp_sent = messaging.sent.lock().unwrap();
    assert_eq!(wp_sent.len(), 1);
    assert_eq!(wp_sent[0].0, "+573178965432");
    let wp_token = correlation::extract(&wp_sent[0].1).expect("messaging notice carries a token");
    drop(wp_sent);

    // Tokens were stored on the matching transactions.
    {
        let row = store.find_transaction("1001").await.unwrap();
        let sheet = store.transactions.read().await;
        assert_eq!(
            sheet.cell(&row, columns::EMAIL_ID).unwrap().to_string(),
            email_token
        );
        assert_eq!(
            sheet.cell(&row, columns::ESTADO).unwrap().to_string(),
            RemediationState::EnProceso.label()
        );

        let row = store.find_transaction("1002").await.unwrap();
        assert_eq!(
            sheet.cell(&row, columns::WP_ID).unwrap().to_string(),
            wp_token
        );

        let row = store.find_transaction("1003").await.unwrap();
        assert_eq!(
            sheet.cell(&row, columns::ESTADO).unwrap().to_string(),
            RemediationState::NoProcesado.label()
        );
    }

    // ── Counterparty replies, correlated through the token ───────────
    let reply = format!("Confirmo que la transacción es mía, caso {wp_token}");
    assert!(store.add_whatsapp_message(&wp_token, &reply).await);

    let ledger = store.wp_history.read().await;
    assert_eq!(ledger.len(), 1);
    let entries = ledger
        .find(columns::WP_ID, &remedia::store::CellValue::text(wp_token.as_str()))
        .unwrap();
    assert_eq!(
        ledger.cell(&entries[0], columns::MOVIMIENTO).unwrap().to_string(),
        "1002"
    );
    drop(ledger);

    // A reply with an unknown token is rejected, never orphaned.
    assert!(!store.add_whatsapp_message("zzzzzz-zzzzzz", "hola").await);
    assert_eq!(store.wp_history.read().await.len(), 1);

    // ── Operator resolves the case ───────────────────────────────────
    assert!(store.update_state("1002", RemediationState::Completado).await);
    assert!(store.save_all().await);

    // Re-uploading the same batch is a no-op.
    let outcome = processor.process_batch(upload_rows(), None).await.unwrap();
    assert_eq!(outcome, BatchOutcome::NoNewTransactions);

    // The resolved state survived the second pass.
    let row = store.find_transaction("1002").await.unwrap();
    let sheet = store.transactions.read().await;
    assert_eq!(
        sheet.cell(&row, columns::ESTADO).unwrap().to_string(),
        RemediationState::Completado.label()
    );
}
