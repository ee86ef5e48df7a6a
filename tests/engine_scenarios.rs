use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use stashkit::cache::{
    CacheConfig, CacheEngine, CacheError, CacheHeader, CacheOptions, MemoryStorage,
    set_cache_header,
};
use stashkit::context::{self, BackgroundTasks, RequestContext};
use url::Url;

struct Runtime {
    engine: CacheEngine,
    background: BackgroundTasks,
}

impl Runtime {
    fn new() -> Self {
        Self {
            engine: CacheEngine::new(Arc::new(MemoryStorage::default()), CacheConfig::default()),
            background: BackgroundTasks::new(),
        }
    }

    async fn request<F: Future>(&self, path: &str, fut: F) -> F::Output {
        let url = Url::parse("https://app.test")
            .and_then(|base| base.join(path))
            .expect("valid url");
        let output = context::scope(RequestContext::new(url, self.background.clone()), fut).await;
        self.background.wait_idle().await;
        output
    }
}

fn counted(
    calls: &Arc<AtomicUsize>,
) -> impl Fn(()) -> std::future::Ready<Result<u32, Infallible>> + Send + Sync + 'static {
    let calls = calls.clone();
    move |_: ()| {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(1))
    }
}

#[tokio::test]
async fn never_assigned_tag_has_no_effect_but_the_real_tag_does() {
    let runtime = Runtime::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let f = runtime
        .engine
        .cached(counted(&calls), ["x"], CacheOptions::new().tags(["real"]))
        .expect("wrap");

    assert_eq!(runtime.request("/", f.call(())).await.expect("call"), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(runtime.request("/", f.call(())).await.expect("call"), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    runtime
        .request("/", async { runtime.engine.revalidate_tag("unassigned") })
        .await
        .expect("trigger");
    runtime.request("/", f.call(())).await.expect("call");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    runtime
        .request("/", async { runtime.engine.revalidate_tag("real") })
        .await
        .expect("trigger");
    runtime.request("/", f.call(())).await.expect("call");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn independently_tagged_fetchers_are_isolated() {
    let runtime = Runtime::new();
    let a_calls = Arc::new(AtomicUsize::new(0));
    let b_calls = Arc::new(AtomicUsize::new(0));
    let a = runtime
        .engine
        .cached(counted(&a_calls), ["a"], CacheOptions::new().tags(["a"]))
        .expect("wrap");
    let b = runtime
        .engine
        .cached(counted(&b_calls), ["b"], CacheOptions::new().tags(["b"]))
        .expect("wrap");

    runtime.request("/", a.call(())).await.expect("call");
    runtime.request("/", b.call(())).await.expect("call");
    runtime
        .request("/", async { runtime.engine.revalidate_tag("a") })
        .await
        .expect("trigger");
    runtime.request("/", a.call(())).await.expect("call");
    runtime.request("/", b.call(())).await.expect("call");

    assert_eq!(a_calls.load(Ordering::SeqCst), 2);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn tags_differing_by_leading_slash_are_distinct() {
    let runtime = Runtime::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let f = runtime
        .engine
        .cached(counted(&calls), ["slash"], CacheOptions::new().tags(["a"]))
        .expect("wrap");

    runtime.request("/", f.call(())).await.expect("call");
    runtime
        .request("/", async { runtime.engine.revalidate_tag("/a") })
        .await
        .expect("trigger");
    runtime.request("/", f.call(())).await.expect("call");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    runtime
        .request("/", async { runtime.engine.revalidate_tag("a") })
        .await
        .expect("trigger");
    runtime.request("/", f.call(())).await.expect("call");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn zero_revalidate_is_rejected_before_any_call() {
    let runtime = Runtime::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let result = runtime
        .engine
        .cached(counted(&calls), ["k"], CacheOptions::new().revalidate(0));

    let err = result.err().expect("rejected");
    assert!(matches!(err, CacheError::InvalidRevalidate));
    assert!(err.to_string().contains("revalidate: 0"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn registration_happens_on_hits() {
    let runtime = Runtime::new();
    let calls = Arc::new(AtomicUsize::new(0));

    // Same key parts and arguments, so both wrappers share one entry.
    let first = runtime
        .engine
        .cached(counted(&calls), ["shared"], CacheOptions::new().tags(["first"]))
        .expect("wrap");
    let second = runtime
        .engine
        .cached(counted(&calls), ["shared"], CacheOptions::new().tags(["second"]))
        .expect("wrap");

    runtime.request("/", first.call(())).await.expect("call");
    runtime.request("/", second.call(())).await.expect("call");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // `second` only ever hit, yet its tag now reaches the entry.
    runtime
        .request("/", async { runtime.engine.revalidate_tag("second") })
        .await
        .expect("trigger");
    runtime.request("/", second.call(())).await.expect("call");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn path_revalidation_reaches_entries_by_request_path() {
    let runtime = Runtime::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let f = runtime
        .engine
        .cached(counted(&calls), ["page"], CacheOptions::new())
        .expect("wrap");

    for path in ["/users/123", "/users/456", "/posts/1"] {
        runtime.request(path, f.call(())).await.expect("call");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    runtime
        .request("/admin", async { runtime.engine.revalidate_path("/users/*") })
        .await
        .expect("trigger");

    for path in ["/users/123", "/users/456", "/posts/1"] {
        runtime.request(path, f.call(())).await.expect("call");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn revalidate_period_sets_stored_max_age() {
    let runtime = Runtime::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let short = runtime
        .engine
        .cached(counted(&calls), ["short"], CacheOptions::new().revalidate(5))
        .expect("wrap");
    let forever = runtime
        .engine
        .cached(counted(&calls), ["forever"], CacheOptions::new())
        .expect("wrap");

    assert_eq!(short.cache_control().to_string(), "max-age=5");
    assert_eq!(forever.cache_control().to_string(), "max-age=31536000");
}

#[tokio::test(start_paused = true)]
async fn expired_entries_are_refetched() {
    let runtime = Runtime::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let f = runtime
        .engine
        .cached(counted(&calls), ["ttl"], CacheOptions::new().revalidate(5))
        .expect("wrap");

    runtime.request("/", f.call(())).await.expect("call");
    tokio::time::advance(std::time::Duration::from_secs(4)).await;
    runtime.request("/", f.call(())).await.expect("call");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(std::time::Duration::from_secs(2)).await;
    runtime.request("/", f.call(())).await.expect("call");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn entry_keys_lists_written_entries() {
    let runtime = Runtime::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let f = runtime
        .engine
        .cached(counted(&calls), ["listed"], CacheOptions::new())
        .expect("wrap");

    runtime.request("/a", f.call(())).await.expect("call");
    let keys = runtime
        .request("/", runtime.engine.entry_keys())
        .await
        .expect("keys");

    assert_eq!(
        keys,
        vec!["https://app.test/__stashkit/__cache__/a?key=listed".to_string()]
    );
}

#[tokio::test]
async fn set_cache_header_writes_to_the_current_response() {
    let ctx = RequestContext::new(
        Url::parse("https://app.test/").expect("valid url"),
        BackgroundTasks::new(),
    );

    let rendered = context::scope(ctx.clone(), async {
        set_cache_header(&CacheHeader::new().max_age(std::time::Duration::from_secs(604_800)))
    })
    .await
    .expect("inside request");

    assert_eq!(rendered, "max-age=604800");
    let headers = ctx.take_response_headers();
    assert_eq!(headers.get("cache-control").expect("set"), "max-age=604800");
}
