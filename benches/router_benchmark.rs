use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

use webengine::{
    request::Request,
    response::Response,
    route::{HandlerFault, Reply, Route, RouteTable},
    router::{match_path, RouteOutcome, Router},
    Invocation,
};

fn noop(_inv: &mut Invocation<'_>) -> Result<Reply, HandlerFault> {
    Ok(Reply::Empty)
}

fn build_router(groups: usize) -> Router {
    let mut builder = RouteTable::builder();
    for i in 0..groups {
        builder = builder.group(&format!("/api{}", i), |g| {
            g.add(Route::get("/users", noop))
                .add(Route::post("/users", noop))
                .add(Route::get("/users/{id}", noop))
                .add(Route::delete("/users/{id}", noop))
                .add(Route::get("/users/{id}/posts/{post}", noop))
        });
    }
    Router::new(builder.build())
}

fn parsed(runtime: &Runtime, raw: &str) -> Request {
    runtime
        .block_on(Request::from_bytes(raw.as_bytes(), 0))
        .unwrap()
        .unwrap()
}

fn match_path_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_path");

    let cases = [
        ("literal", "/users/list", "/users/list"),
        ("one_variable", "/users/{id}", "/users/42"),
        ("two_variables", "/users/{id}/posts/{post}", "/users/42/posts/7"),
        ("mismatch", "/users/{id}/posts/{post}", "/users/42/comments/7"),
    ];

    for (name, template, path) in cases.iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(name),
            &(template, path),
            |b, (template, path)| {
                b.iter(|| match_path(black_box(template), black_box(path)));
            },
        );
    }

    group.finish();
}

fn router_resolve_benchmark(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let router = build_router(10);
    let mut group = c.benchmark_group("router_resolve");

    let requests = [
        ("literal_first_group", "GET /api0/users HTTP/1.1\r\n\r\n"),
        ("literal_last_group", "GET /api9/users HTTP/1.1\r\n\r\n"),
        ("templated", "GET /api5/users/42/posts/7 HTTP/1.1\r\n\r\n"),
        ("head", "HEAD /api5/users/42 HTTP/1.1\r\n\r\n"),
        ("options", "OPTIONS /api5/users/42 HTTP/1.1\r\n\r\n"),
        ("method_not_allowed", "PUT /api5/users HTTP/1.1\r\n\r\n"),
        ("not_found", "GET /nothing/here HTTP/1.1\r\n\r\n"),
    ];

    for (name, raw) in requests.iter() {
        let request = parsed(&runtime, raw);
        group.bench_with_input(BenchmarkId::from_parameter(name), &request, |b, request| {
            b.iter(|| {
                let mut response = Response::for_request(request);
                let outcome = router.resolve(black_box(request), &mut response);
                black_box(matches!(outcome, RouteOutcome::Matched(_)));
            });
        });
    }

    group.finish();
}

fn router_table_size_benchmark(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("router_table_size");
    let request = parsed(&runtime, "GET /api0/users/42/posts/7 HTTP/1.1\r\n\r\n");

    for groups in [1, 10, 100].iter() {
        let router = build_router(*groups);
        group.bench_with_input(BenchmarkId::from_parameter(groups), &router, |b, router| {
            b.iter(|| {
                let mut response = Response::for_request(&request);
                let outcome = router.resolve(black_box(&request), &mut response);
                black_box(matches!(outcome, RouteOutcome::Matched(_)));
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    match_path_benchmark,
    router_resolve_benchmark,
    router_table_size_benchmark
);
criterion_main!(benches);
