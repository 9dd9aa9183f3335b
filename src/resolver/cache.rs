//! DNS缓存实现
//!
//! 按 (域名, 类型, 类别) 缓存完整的已解码响应。过期条目在访问时惰性淘汰，
//! 也可以调用 [`DnsCache::purge_expired`] 主动清理。

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

use crate::logger::SharedLogger;
use crate::types::{normalize_name, QClass, Query, RecordData, RecordType, Response, ResponseCode};
use crate::{dns_cache_hit, dns_cache_miss, dns_debug};

/// 缓存配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// 最大条目数（LRU淘汰）
    pub capacity: usize,
    /// TTL上限
    pub max_ttl: Duration,
    /// NXDOMAIN负缓存的TTL下限，`None` 表示不缓存负响应
    pub negative_ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: crate::config::DEFAULT_CACHE_CAPACITY,
            max_ttl: Duration::from_secs(crate::config::DEFAULT_MAX_TTL_SECS),
            negative_ttl: None,
        }
    }
}

/// 缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    name: String,
    qtype: u16,
    qclass: u16,
}

impl CacheKey {
    /// 创建缓存键，域名大小写不敏感
    pub fn new(name: &str, qtype: RecordType, qclass: QClass) -> Self {
        Self {
            name: normalize_name(name),
            qtype: qtype.into(),
            qclass: qclass.into(),
        }
    }

    /// 从查询创建缓存键
    pub fn from_query(query: &Query) -> Self {
        Self::new(query.name(), query.qtype(), query.qclass())
    }
}

/// DNS缓存条目
#[derive(Debug, Clone)]
struct CacheEntry {
    response: Response,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    // 截止时间溢出视为永不过期
    fn is_expired(&self, now: Instant) -> bool {
        self.inserted_at
            .checked_add(self.ttl)
            .map_or(false, |deadline| now >= deadline)
    }
}

/// 缓存统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// 命中次数
    pub hits: u64,
    /// 未命中次数
    pub misses: u64,
    /// 插入次数
    pub inserts: u64,
    /// 过期或容量淘汰次数
    pub evictions: u64,
    /// 当前缓存大小
    pub current_size: usize,
}

#[derive(Debug)]
struct Inner {
    entries: LruCache<CacheKey, CacheEntry>,
    stats: CacheStats,
}

/// DNS缓存
///
/// 内部加锁，可在多个并发解析之间共享。同一个键的并发插入以最后写入者为准，
/// 读者只会看到完整写入的条目。
#[derive(Debug)]
pub struct DnsCache {
    inner: Mutex<Inner>,
    config: CacheConfig,
    logger: SharedLogger,
}

impl DnsCache {
    /// 创建新的DNS缓存
    pub fn new(config: CacheConfig, logger: SharedLogger) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
            config,
            logger,
        }
    }

    /// 查找未过期的缓存响应
    pub fn lookup(&self, name: &str, qtype: RecordType, qclass: QClass) -> Option<Response> {
        let key = CacheKey::new(name, qtype, qclass);
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get(&key) {
            Some(entry) if !entry.is_expired(now) => {
                let response = entry.response.clone();
                inner.stats.hits += 1;
                dns_cache_hit!(self.logger, key.name);
                return Some(response);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.pop(&key);
            inner.stats.evictions += 1;
            inner.stats.current_size = inner.entries.len();
        }
        inner.stats.misses += 1;
        dns_cache_miss!(self.logger, key.name);
        None
    }

    /// 按查询查找
    pub fn get(&self, query: &Query) -> Option<Response> {
        self.lookup(query.name(), query.qtype(), query.qclass())
    }

    /// 插入缓存记录，返回生效的TTL；TTL为0时不缓存并返回 `None`
    pub fn insert(&self, name: &str, qtype: RecordType, qclass: QClass, response: Response) -> Option<Duration> {
        let ttl = self.effective_ttl(&response);
        if ttl.is_zero() {
            dns_debug!(self.logger, "💾 不缓存 {} {}: TTL为0", name, qtype);
            return None;
        }

        let key = CacheKey::new(name, qtype, qclass);
        let entry = CacheEntry {
            response,
            inserted_at: Instant::now(),
            ttl,
        };

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if let Some((evicted, _)) = inner.entries.push(key.clone(), entry) {
            if evicted != key {
                inner.stats.evictions += 1;
            }
        }
        inner.stats.inserts += 1;
        inner.stats.current_size = inner.entries.len();
        dns_debug!(self.logger, "💾 缓存 {} {} TTL {}s", key.name, qtype, ttl.as_secs());
        Some(ttl)
    }

    /// 计算响应的有效TTL
    ///
    /// NOERROR取回答部分的最小TTL，无回答时为0；NXDOMAIN仅在配置了负缓存时缓存；
    /// 截断响应和其他响应码一律不缓存。结果不超过 `max_ttl`。
    pub fn effective_ttl(&self, response: &Response) -> Duration {
        if response.is_truncated() {
            return Duration::ZERO;
        }

        let ttl = match response.rcode() {
            ResponseCode::NoError => response
                .min_answer_ttl()
                .map(|ttl| Duration::from_secs(u64::from(ttl)))
                .unwrap_or(Duration::ZERO),
            ResponseCode::NxDomain => match self.config.negative_ttl {
                Some(floor) => floor.max(soa_negative_ttl(response).unwrap_or(Duration::ZERO)),
                None => Duration::ZERO,
            },
            _ => Duration::ZERO,
        };

        ttl.min(self.config.max_ttl)
    }

    /// 清理所有过期条目，返回清理的数量
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.entries.pop(key);
        }
        inner.stats.evictions += expired.len() as u64;
        inner.stats.current_size = inner.entries.len();
        expired.len()
    }

    /// 移除指定查询的缓存
    pub fn remove(&self, name: &str, qtype: RecordType, qclass: QClass) -> bool {
        let key = CacheKey::new(name, qtype, qclass);
        let mut inner = self.inner.lock();
        let removed = inner.entries.pop(&key).is_some();
        inner.stats.current_size = inner.entries.len();
        removed
    }

    /// 清空缓存
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.stats.current_size = 0;
    }

    /// 获取缓存大小（含尚未淘汰的过期条目）
    pub fn size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// 获取缓存统计
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats.clone()
    }

    /// 获取命中率
    pub fn hit_rate(&self) -> f64 {
        let stats = self.stats();
        let total = stats.hits + stats.misses;
        if total == 0 {
            0.0
        } else {
            stats.hits as f64 / total as f64
        }
    }

    /// 缓存配置
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

/// 权威部分SOA推导的负缓存TTL：min(SOA记录TTL, MINIMUM)
fn soa_negative_ttl(response: &Response) -> Option<Duration> {
    response.authorities.iter().find_map(|record| match &record.data {
        RecordData::SOA { minimum, .. } => {
            Some(Duration::from_secs(u64::from(record.ttl.min(*minimum))))
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns_response::DnsResponseBuilder;
    use crate::logger::SilentLogger;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn cache_with(config: CacheConfig) -> DnsCache {
        DnsCache::new(config, Arc::new(SilentLogger))
    }

    fn a_response(ttl: u32) -> Response {
        DnsResponseBuilder::new()
            .with_id(12345)
            .add_query("example.com", RecordType::A, QClass::IN)
            .add_a_answer("example.com", ttl, Ipv4Addr::new(93, 184, 216, 34))
            .build()
    }

    fn nxdomain(soa_ttl: u32, minimum: u32) -> Response {
        DnsResponseBuilder::new()
            .with_response_code(ResponseCode::NxDomain)
            .add_query("missing.example.com", RecordType::A, QClass::IN)
            .add_soa_authority("example.com", soa_ttl, "ns1.example.com", "hostmaster.example.com", minimum)
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_insert_and_lookup_until_expiry() {
        let cache = cache_with(CacheConfig::default());
        let response = a_response(300);

        assert_eq!(
            cache.insert("example.com", RecordType::A, QClass::IN, response.clone()),
            Some(Duration::from_secs(300))
        );

        let first = cache.lookup("EXAMPLE.com.", RecordType::A, QClass::IN).unwrap();
        let second = cache.lookup("example.com", RecordType::A, QClass::IN).unwrap();
        assert_eq!(first, response);
        assert_eq!(first, second);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.lookup("example.com", RecordType::A, QClass::IN).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.lookup("example.com", RecordType::A, QClass::IN).is_none());
        assert_eq!(cache.size(), 0);

        let stats = cache.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_does_not_overflow_on_lookup() {
        let cache = cache_with(CacheConfig {
            max_ttl: Duration::MAX,
            negative_ttl: Some(Duration::from_secs(i64::MAX as u64)),
            ..CacheConfig::default()
        });

        let ttl = cache.insert("missing.example.com", RecordType::A, QClass::IN, nxdomain(60, 60));
        assert_eq!(ttl, Some(Duration::from_secs(i64::MAX as u64)));
        assert!(cache.lookup("missing.example.com", RecordType::A, QClass::IN).is_some());

        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        assert!(cache.lookup("missing.example.com", RecordType::A, QClass::IN).is_some());
        assert_eq!(cache.purge_expired(), 0);
    }

    #[test]
    fn test_zero_ttl_and_empty_answers_not_cached() {
        let cache = cache_with(CacheConfig::default());
        assert_eq!(cache.insert("example.com", RecordType::A, QClass::IN, a_response(0)), None);

        let empty = DnsResponseBuilder::new()
            .add_query("example.com", RecordType::A, QClass::IN)
            .build();
        assert_eq!(cache.insert("example.com", RecordType::A, QClass::IN, empty), None);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_effective_ttl_is_minimum_and_clamped() {
        let cache = cache_with(CacheConfig {
            max_ttl: Duration::from_secs(600),
            ..CacheConfig::default()
        });
        let response = DnsResponseBuilder::new()
            .add_query("example.com", RecordType::A, QClass::IN)
            .add_a_answer("example.com", 900, Ipv4Addr::new(1, 1, 1, 1))
            .add_a_answer("example.com", 700, Ipv4Addr::new(1, 0, 0, 1))
            .build();
        assert_eq!(cache.effective_ttl(&response), Duration::from_secs(600));
        assert_eq!(cache.effective_ttl(&a_response(120)), Duration::from_secs(120));

        let truncated = DnsResponseBuilder::new()
            .with_truncated(true)
            .add_a_answer("example.com", 300, Ipv4Addr::new(1, 1, 1, 1))
            .build();
        assert_eq!(cache.effective_ttl(&truncated), Duration::ZERO);
    }

    #[test]
    fn test_negative_caching_is_opt_in() {
        let disabled = cache_with(CacheConfig::default());
        assert_eq!(disabled.effective_ttl(&nxdomain(3600, 900)), Duration::ZERO);

        let enabled = cache_with(CacheConfig {
            negative_ttl: Some(Duration::from_secs(60)),
            ..CacheConfig::default()
        });
        // min(3600, 900) = 900 高于下限
        assert_eq!(enabled.effective_ttl(&nxdomain(3600, 900)), Duration::from_secs(900));
        // min(30, 900) = 30 低于下限
        assert_eq!(enabled.effective_ttl(&nxdomain(30, 900)), Duration::from_secs(60));

        let servfail = DnsResponseBuilder::new()
            .with_response_code(ResponseCode::ServerFailure)
            .build();
        assert_eq!(enabled.effective_ttl(&servfail), Duration::ZERO);
    }

    #[test]
    fn test_last_writer_wins_and_lru_capacity() {
        let cache = cache_with(CacheConfig {
            capacity: 2,
            ..CacheConfig::default()
        });
        cache.insert("example.com", RecordType::A, QClass::IN, a_response(100));
        cache.insert("example.com", RecordType::A, QClass::IN, a_response(200));
        assert_eq!(
            cache.lookup("example.com", RecordType::A, QClass::IN).unwrap().answers[0].ttl,
            200
        );

        cache.insert("a.example", RecordType::A, QClass::IN, a_response(100));
        cache.insert("b.example", RecordType::A, QClass::IN, a_response(100));
        assert_eq!(cache.size(), 2);
        assert!(cache.lookup("example.com", RecordType::A, QClass::IN).is_none());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_key_includes_type_and_class() {
        let cache = cache_with(CacheConfig::default());
        cache.insert("example.com", RecordType::A, QClass::IN, a_response(300));
        assert!(cache.lookup("example.com", RecordType::AAAA, QClass::IN).is_none());
        assert!(cache.lookup("example.com", RecordType::A, QClass::CH).is_none());
        assert!(cache.remove("example.com", RecordType::A, QClass::IN));
        assert!(!cache.remove("example.com", RecordType::A, QClass::IN));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = cache_with(CacheConfig::default());
        cache.insert("short.example", RecordType::A, QClass::IN, a_response(10));
        cache.insert("long.example", RecordType::A, QClass::IN, a_response(1000));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.size(), 1);
        assert!(cache.lookup("long.example", RecordType::A, QClass::IN).is_some());
    }

    #[test]
    fn test_concurrent_lookups_see_complete_entries() {
        let cache = Arc::new(cache_with(CacheConfig::default()));
        let expected = a_response(300);
        cache.insert("example.com", RecordType::A, QClass::IN, expected.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let expected = expected.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let found = cache.lookup("example.com", RecordType::A, QClass::IN).unwrap();
                        assert_eq!(found, expected);
                        cache.insert("example.com", RecordType::A, QClass::IN, expected.clone());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.stats().hits, 800);
    }
}
