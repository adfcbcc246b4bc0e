//! Batch URI validation with per-domain pacing and a TTL result cache.
//!
//! The batch is grouped by domain; a bounded worker pool processes one domain
//! per worker at a time, so a single host never sees concurrent requests and
//! the per-domain rate limit holds. Results are cached by URI and re-served
//! within the TTL without a new request, with the source context rewritten
//! from the fresh input. Cancellation is cooperative and per-link.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// One URI to validate, with optional caller context carried through to the
/// result.
#[derive(Debug, Clone)]
pub struct LinkInput {
    pub url: String,
    pub source: Option<String>,
}

impl LinkInput {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Validation verdict for one URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    /// 2xx.
    Valid,
    /// 3xx, with the Location header when present.
    Redirect { location: Option<String> },
    /// 4xx.
    Invalid { code: u16 },
    Timeout,
    /// Transport-level failure.
    Error { message: String },
    /// Domain configured skip, or cancelled before the request.
    Skipped,
}

/// One validated URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkResult {
    pub url: String,
    pub domain: String,
    pub status: LinkStatus,
    pub attempts: u32,
    pub duration: Duration,
    pub source: Option<String>,
    pub from_cache: bool,
}

/// Per-domain behaviour.
#[derive(Debug, Clone)]
pub struct DomainPolicy {
    /// Minimum interval between requests to the domain.
    pub rate_limit: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
    pub skip: bool,
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self {
            rate_limit: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            skip: false,
        }
    }
}

/// Batch configuration.
#[derive(Debug, Clone)]
pub struct CheckConfig {
    /// Domains validated in parallel.
    pub concurrency: usize,
    pub default_policy: DomainPolicy,
    pub domains: HashMap<String, DomainPolicy>,
    pub cache_ttl: Duration,
    /// Base unit of the quadratic retry backoff (attempt² × base).
    pub retry_base: Duration,
    pub user_agent: String,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            default_policy: DomainPolicy::default(),
            domains: HashMap::new(),
            cache_ttl: Duration::from_secs(3600),
            retry_base: Duration::from_millis(500),
            user_agent: concat!("regula-linkcheck/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl CheckConfig {
    fn policy_for(&self, domain: &str) -> &DomainPolicy {
        self.domains.get(domain).unwrap_or(&self.default_policy)
    }
}

/// Progress callback payload.
#[derive(Debug, Clone)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub current_url: String,
    pub current_domain: String,
    pub elapsed: Duration,
    pub estimated_left: Option<Duration>,
}

/// Cooperative cancellation token.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What one HTTP attempt observed.
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    Status { code: u16, location: Option<String> },
    Timeout,
    Transport(String),
}

/// Transport seam: HEAD and GET attempts against one URL.
pub trait HttpProbe: Send + Sync {
    fn head(&self, url: &str, timeout: Duration, user_agent: &str) -> ProbeOutcome;
    fn get(&self, url: &str, timeout: Duration, user_agent: &str) -> ProbeOutcome;
}

/// Default probe over ureq.
pub struct UreqProbe;

impl UreqProbe {
    fn call(&self, method: &str, url: &str, timeout: Duration, user_agent: &str) -> ProbeOutcome {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .redirects(0)
            .build();
        let result = agent
            .request(method, url)
            .set("User-Agent", user_agent)
            .call();
        match result {
            Ok(response) => ProbeOutcome::Status {
                code: response.status(),
                location: response.header("Location").map(str::to_string),
            },
            Err(ureq::Error::Status(code, response)) => ProbeOutcome::Status {
                code,
                location: response.header("Location").map(str::to_string),
            },
            Err(ureq::Error::Transport(t)) => {
                let message = t.to_string();
                if message.contains("timed out") || message.contains("timeout") {
                    ProbeOutcome::Timeout
                } else {
                    ProbeOutcome::Transport(message)
                }
            }
        }
    }
}

impl HttpProbe for UreqProbe {
    fn head(&self, url: &str, timeout: Duration, user_agent: &str) -> ProbeOutcome {
        self.call("HEAD", url, timeout, user_agent)
    }

    fn get(&self, url: &str, timeout: Duration, user_agent: &str) -> ProbeOutcome {
        self.call("GET", url, timeout, user_agent)
    }
}

struct CacheEntry {
    result: LinkResult,
    inserted: Instant,
}

/// Extract the host from an absolute http(s) URL.
pub fn domain_of(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.split('@').next_back()?;
    let host = host.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// The batch validator.
pub struct LinkChecker {
    config: CheckConfig,
    probe: Box<dyn HttpProbe>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    last_request: DashMap<String, Instant>,
}

impl LinkChecker {
    pub fn new(config: CheckConfig) -> Self {
        Self::with_probe(config, Box::new(UreqProbe))
    }

    pub fn with_probe(config: CheckConfig, probe: Box<dyn HttpProbe>) -> Self {
        Self {
            config,
            probe,
            cache: RwLock::new(HashMap::new()),
            last_request: DashMap::new(),
        }
    }

    /// Validate a batch. Results come back in input order. A triggered
    /// cancellation token marks the remaining links Skipped.
    pub fn validate_links(
        &self,
        inputs: &[LinkInput],
        cancel: &CancelToken,
        progress: Option<&(dyn Fn(Progress) + Sync)>,
    ) -> Vec<LinkResult> {
        let started = Instant::now();
        let total = inputs.len();
        let completed = AtomicUsize::new(0);

        let mut results: Vec<Option<LinkResult>> = vec![None; total];
        let mut by_domain: HashMap<String, Vec<(usize, LinkInput)>> = HashMap::new();

        for (idx, input) in inputs.iter().enumerate() {
            let Some(domain) = domain_of(&input.url) else {
                completed.fetch_add(1, Ordering::SeqCst);
                results[idx] = Some(LinkResult {
                    url: input.url.clone(),
                    domain: String::new(),
                    status: LinkStatus::Error {
                        message: "invalid URL".into(),
                    },
                    attempts: 0,
                    duration: Duration::ZERO,
                    source: input.source.clone(),
                    from_cache: false,
                });
                continue;
            };
            if let Some(hit) = self.cache_lookup(&input.url) {
                completed.fetch_add(1, Ordering::SeqCst);
                // Cache hit: the verdict is reused, the context is the
                // caller's fresh one.
                results[idx] = Some(LinkResult {
                    source: input.source.clone(),
                    from_cache: true,
                    ..hit
                });
                continue;
            }
            by_domain.entry(domain).or_default().push((idx, input.clone()));
        }

        let queue: Mutex<VecDeque<(String, Vec<(usize, LinkInput)>)>> =
            Mutex::new(by_domain.into_iter().collect());
        let workers = self.config.concurrency.max(1);
        let (tx, rx) = mpsc::channel::<(usize, LinkResult)>();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                let completed = &completed;
                scope.spawn(move || {
                    loop {
                        let group = queue.lock().expect("queue lock poisoned").pop_front();
                        let Some((domain, links)) = group else {
                            break;
                        };
                        let policy = self.config.policy_for(&domain);
                        for (idx, input) in links {
                            let result = if cancel.is_cancelled() || policy.skip {
                                LinkResult {
                                    url: input.url.clone(),
                                    domain: domain.clone(),
                                    status: LinkStatus::Skipped,
                                    attempts: 0,
                                    duration: Duration::ZERO,
                                    source: input.source.clone(),
                                    from_cache: false,
                                }
                            } else {
                                self.check_one(&domain, policy, &input)
                            };
                            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                            if let Some(callback) = progress {
                                let elapsed = started.elapsed();
                                let estimated_left = (done > 0 && done < total).then(|| {
                                    elapsed.mul_f64((total - done) as f64 / done as f64)
                                });
                                callback(Progress {
                                    total,
                                    completed: done,
                                    current_url: input.url.clone(),
                                    current_domain: domain.clone(),
                                    elapsed,
                                    estimated_left,
                                });
                            }
                            let _ = tx.send((idx, result));
                        }
                    }
                });
            }
            drop(tx);
            for (idx, result) in rx {
                results[idx] = Some(result);
            }
        });

        let results: Vec<LinkResult> = results
            .into_iter()
            .map(|r| r.expect("every input produces a result"))
            .collect();

        // Fresh verdicts enter the cache; skips and cancellations do not.
        {
            let mut cache = self.cache.write().expect("cache lock poisoned");
            for result in &results {
                if !result.from_cache && result.status != LinkStatus::Skipped {
                    cache.insert(
                        result.url.clone(),
                        CacheEntry {
                            result: result.clone(),
                            inserted: Instant::now(),
                        },
                    );
                }
            }
        }

        results
    }

    /// Non-expired cache entry for a URL. Expired entries are removed on
    /// access.
    fn cache_lookup(&self, url: &str) -> Option<LinkResult> {
        {
            let cache = self.cache.read().expect("cache lock poisoned");
            match cache.get(url) {
                Some(entry) if entry.inserted.elapsed() < self.config.cache_ttl => {
                    return Some(entry.result.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Lazy expiry under the write lock.
        let mut cache = self.cache.write().expect("cache lock poisoned");
        cache.remove(url);
        None
    }

    fn respect_rate_limit(&self, domain: &str, policy: &DomainPolicy) {
        if let Some(last) = self.last_request.get(domain) {
            let since = last.elapsed();
            if since < policy.rate_limit {
                std::thread::sleep(policy.rate_limit - since);
            }
        }
        self.last_request.insert(domain.to_string(), Instant::now());
    }

    fn check_one(&self, domain: &str, policy: &DomainPolicy, input: &LinkInput) -> LinkResult {
        let started = Instant::now();
        let mut attempts = 0;
        let mut last_status = LinkStatus::Error {
            message: "no attempt made".into(),
        };

        while attempts <= policy.max_retries {
            attempts += 1;
            if attempts > 1 {
                // Quadratic backoff: attempt² × base.
                let back = self.config.retry_base * (attempts * attempts);
                std::thread::sleep(back);
            }
            self.respect_rate_limit(domain, policy);

            let mut outcome = self
                .probe
                .head(&input.url, policy.timeout, &self.config.user_agent);
            if let ProbeOutcome::Status { code: 405, .. } = outcome {
                outcome = self
                    .probe
                    .get(&input.url, policy.timeout, &self.config.user_agent);
            }

            let (status, retry) = match outcome {
                ProbeOutcome::Status { code, location } => match code {
                    200..=299 => (LinkStatus::Valid, false),
                    300..=399 => (LinkStatus::Redirect { location }, false),
                    500..=599 => (
                        LinkStatus::Error {
                            message: format!("HTTP {code}"),
                        },
                        true,
                    ),
                    _ => (LinkStatus::Invalid { code }, false),
                },
                ProbeOutcome::Timeout => (LinkStatus::Timeout, true),
                ProbeOutcome::Transport(message) => (LinkStatus::Error { message }, true),
            };
            last_status = status;
            if !retry {
                break;
            }
        }

        tracing::debug!(url = %input.url, attempts, status = ?last_status, "link checked");
        LinkResult {
            url: input.url.clone(),
            domain: domain.to_string(),
            status: last_status,
            attempts,
            duration: started.elapsed(),
            source: input.source.clone(),
            from_cache: false,
        }
    }
}
