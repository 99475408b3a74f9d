use std::hint::black_box;

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use duo_http::codec::{HeaderChunk, HeaderParser, parse_request_head};

const SMALL_HEADER: &str =
    "GET /index.html HTTP/1.1\r\nHost: 127.0.0.1:8080\r\nUser-Agent: curl/7.79.1\r\nAccept: */*\r\n\r\n";

fn large_header() -> String {
    let mut header = String::from("GET /index/?a=1&b=2&a=3 HTTP/1.1\r\nHost: 127.0.0.1:8080\r\n");
    header.push_str(concat!(
        "User-Agent: Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) ",
        "AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0\r\n",
    ));
    header.push_str("Accept: text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8\r\n");
    header.push_str("Accept-Encoding: gzip, deflate, br\r\nAccept-Language: zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7\r\n");
    for i in 0..20 {
        header.push_str(&format!("X-Custom-{i}: some-reasonably-long-header-value-{i}\r\n"));
    }
    header.push_str("\r\n");
    header
}

fn benchmark_header_parser(criterion: &mut Criterion) {
    let cases = [("small", SMALL_HEADER.to_owned()), ("large", large_header())];
    let mut group = criterion.benchmark_group("header_parser");

    for (name, content) in &cases {
        group.throughput(Throughput::Bytes(content.len() as u64));

        group.bench_with_input(BenchmarkId::new("single_chunk", name), content, |b, content| {
            let mut parser = HeaderParser::default();
            b.iter(|| black_box(parser.append(content.as_bytes())));
        });

        group.bench_with_input(BenchmarkId::new("64_byte_chunks", name), content, |b, content| {
            let mut parser = HeaderParser::default();
            b.iter(|| {
                for chunk in content.as_bytes().chunks(64) {
                    if let complete @ HeaderChunk::Complete { .. } = parser.append(chunk) {
                        black_box(complete);
                    }
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("parse_head", name), content, |b, content| {
            let block = Bytes::from(content.clone());
            b.iter(|| black_box(parse_request_head(&block).expect("benchmark header should be valid")));
        });
    }

    group.finish();
}

criterion_group!(header_parser, benchmark_header_parser);
criterion_main!(header_parser);
