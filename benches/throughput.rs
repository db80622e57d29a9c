use chrono::Utc;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use parley_proto::{
    ContentKind, ConversationId, IdentitySet, Message, MessageId, Reactions, ServerEvent,
    decode_client_frame, encode_server_event,
};
use std::hint::black_box;
use std::sync::Arc;
use tokio::sync::mpsc;

// Measures the two per-recipient costs of a room broadcast: queueing a shared
// frame on every handle, and encoding it on every connection task.

fn sample_message() -> ServerEvent {
    ServerEvent::NewMessage(Message {
        id: MessageId::new(),
        conversation_id: ConversationId::new(),
        sender: "alice".into(),
        text: "Hello world, this is a fairly ordinary chat message.".into(),
        content_kind: ContentKind::Text,
        media_url: None,
        file_name: None,
        file_size: None,
        duration: None,
        reply_to: None,
        forward: None,
        reactions: Reactions::new(),
        read_by: IdentitySet::new(),
        delivered_to: IdentitySet::new(),
        created_at: Utc::now(),
        edited_at: None,
        deleted_at: None,
    })
}

fn fanout_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("fanout");

    for recipients in [2usize, 16, 128] {
        group.throughput(Throughput::Elements(recipients as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(recipients),
            &recipients,
            |b, &recipients| {
                b.to_async(&runtime).iter(|| async move {
                    let mut handles = Vec::with_capacity(recipients);
                    for _ in 0..recipients {
                        handles.push(mpsc::channel::<Arc<ServerEvent>>(4));
                    }
                    let frame = Arc::new(sample_message());
                    for (tx, _) in &handles {
                        let _ = tx.try_send(frame.clone());
                    }
                    for (_, rx) in &mut handles {
                        if let Some(frame) = rx.recv().await {
                            black_box(encode_server_event(&frame).ok());
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

fn inbound_decode_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("inbound");
    let raw = format!(
        r#"{{"event":"send_message","ack":42,"data":{{"conversation_id":"{}","body":{{"text":"Hello world"}}}}}}"#,
        ConversationId::new()
    );
    group.throughput(Throughput::Bytes(raw.len() as u64));

    group.bench_function("decode_send_message", |b| {
        b.iter(|| black_box(decode_client_frame(black_box(&raw)).ok()))
    });

    group.finish();
}

criterion_group!(benches, fanout_benchmark, inbound_decode_benchmark);
criterion_main!(benches);
