use criterion::{black_box, criterion_group, criterion_main, Criterion};

use embedhttp::auth::params;
use embedhttp::base::config::DaemonConfig;
use embedhttp::daemon::Daemon;

fn benchmark_nonce_issue_check(c: &mut Criterion) {
    let daemon = Daemon::new(
        DaemonConfig::new(*b"0123456789abcdef0123456789abcdef").with_nonces_num(1024),
    )
    .unwrap();

    c.bench_function("nonce_issue", |b| {
        b.iter(|| black_box(daemon.issue_nonce(None)))
    });
}

fn benchmark_header_parse(c: &mut Criterion) {
    let header: &[u8] = br#"username="Mufasa", realm="http-auth@example.org", uri="/dir/index.html", algorithm=SHA-256, nonce="7ypf3xlj9XXwfDPEoM4URrvxxwf94BcCAzFZH4GiTo0v", nc=00000001, cnonce="f2/wE4q74E6zIJEtWaHKaf5wv/H5QzzpXusqGemxURZJ", qop=auth, response="753927fa0e85d155564e2e272a28d1802ca10daf4496794697cf8db5856cb6c1", opaque="FQhe/qaU925kfnzjCev0ciny7QMkPqMAFRtzCUYo5tdS""#;

    c.bench_function("credentials_parse", |b| {
        b.iter(|| params::parse(black_box(header)).unwrap())
    });
}

criterion_group!(benches, benchmark_nonce_issue_check, benchmark_header_parse);
criterion_main!(benches);
