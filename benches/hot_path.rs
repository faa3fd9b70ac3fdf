#[path = "../tests/common/eventstream.rs"]
mod eventstream;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use streamrelay::protocol::encode_delta_line;
use streamrelay::stream::{pick_text, EventStreamDecoder, LineBreaker, Utf8Decoder};

fn openai_sse_body(chunks: usize) -> String {
    let mut body = String::new();
    for idx in 0..chunks {
        body.push_str("data: {\"id\":\"chatcmpl\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"tok");
        body.push_str(&idx.to_string());
        body.push_str("\"}}]}\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// Split `body` into fragments of `size` bytes, the way reads arrive.
fn fragments(body: &str, size: usize) -> Vec<Vec<u8>> {
    body.as_bytes().chunks(size).map(<[u8]>::to_vec).collect()
}

fn bench_line_breaking(c: &mut Criterion) {
    let body = openai_sse_body(256);
    let small = fragments(&body, 7);
    let large = fragments(&body, 4096);

    c.bench_function("line_breaker_256_chunks_7b_reads", |b| {
        b.iter(|| {
            let mut decoder = Utf8Decoder::new();
            let mut breaker = LineBreaker::new();
            let mut lines = Vec::new();
            for fragment in &small {
                breaker.feed_into(&decoder.decode(black_box(fragment)), &mut lines);
            }
            black_box(lines.len());
        });
    });

    c.bench_function("line_breaker_256_chunks_4k_reads", |b| {
        b.iter(|| {
            let mut decoder = Utf8Decoder::new();
            let mut breaker = LineBreaker::new();
            let mut lines = Vec::new();
            for fragment in &large {
                breaker.feed_into(&decoder.decode(black_box(fragment)), &mut lines);
            }
            black_box(lines.len());
        });
    });
}

fn bench_extraction(c: &mut Criterion) {
    let openai: serde_json::Value =
        serde_json::from_str(r#"{"choices":[{"index":0,"delta":{"content":"hello"}}]}"#)
            .expect("openai chunk");
    let gemini: serde_json::Value = serde_json::from_str(
        r#"{"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}],"role":"model"}}]}"#,
    )
    .expect("gemini chunk");
    let bedrock: serde_json::Value =
        serde_json::from_str(r#"{"generation":"hi","stop_reason":null}"#).expect("bedrock chunk");

    c.bench_function("pick_text_first_shape", |b| {
        b.iter(|| black_box(pick_text(black_box(&openai))));
    });
    c.bench_function("pick_text_candidate_parts", |b| {
        b.iter(|| black_box(pick_text(black_box(&gemini))));
    });
    c.bench_function("pick_text_last_shape", |b| {
        b.iter(|| black_box(pick_text(black_box(&bedrock))));
    });
}

fn bench_ndjson_encoding(c: &mut Criterion) {
    let short = "Hello";
    let escaped = "line \"one\"\nline\ttwo \u{1f600}".repeat(16);

    c.bench_function("encode_delta_line_short", |b| {
        b.iter(|| black_box(encode_delta_line(black_box(short))));
    });
    c.bench_function("encode_delta_line_escaped_512b", |b| {
        b.iter(|| black_box(encode_delta_line(black_box(&escaped))));
    });
}

fn bench_event_stream_decode(c: &mut Criterion) {
    let frame = eventstream::encode_message(
        &[(":event-type", "chunk"), (":message-type", "event")],
        br#"{"bytes":"eyJnZW5lcmF0aW9uIjoiaGkifQ=="}"#,
    );
    let wire: Vec<u8> = std::iter::repeat(frame.as_ref())
        .take(128)
        .flatten()
        .copied()
        .collect();

    c.bench_function("event_stream_decode_128_frames", |b| {
        b.iter(|| {
            let mut decoder = EventStreamDecoder::new();
            decoder.push(black_box(&wire));
            let mut count = 0usize;
            while let Ok(Some(message)) = decoder.next_message() {
                count += message.payload.len();
            }
            black_box(count);
        });
    });
}

criterion_group!(
    benches,
    bench_line_breaking,
    bench_extraction,
    bench_ndjson_encoding,
    bench_event_stream_decode
);
criterion_main!(benches);
