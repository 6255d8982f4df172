use std::collections::HashMap;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Script};
use async_trait::async_trait;

use super::{now_timestamp, Redirect, RedirectStore, Resolver, StoreError, PAGE_LIMIT};

// ─── Key layout ──────────────────────────────────────────────────
//
//   redirect:seq            INCR counter handing out ids
//   redirect:path:<path>    id owning the path
//   redirect:<id>           hash { id, path, url, last_updated, inactive }
//   redirect:index          sorted set of ids, score = id

const SEQ_KEY: &str = "redirect:seq";
const INDEX_KEY: &str = "redirect:index";
const PATH_PREFIX: &str = "redirect:path:";
const RECORD_PREFIX: &str = "redirect:";

fn path_key(path: &str) -> String {
    format!("{PATH_PREFIX}{path}")
}

fn record_key(id: u64) -> String {
    format!("{RECORD_PREFIX}{id}")
}

// ─── Scripts ─────────────────────────────────────────────────────
//
// Path claims and record writes happen in one script so a failure can
// never leave a path claimed without a record behind it.

/// KEYS: path key, seq, index. ARGV: path, url, last_updated, record prefix.
/// Returns the new id, or 0 when the path is taken.
const CREATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
local id = redis.call('INCR', KEYS[2])
redis.call('SET', KEYS[1], id)
redis.call('HSET', ARGV[4] .. id,
  'id', id, 'path', ARGV[1], 'url', ARGV[2],
  'last_updated', ARGV[3], 'inactive', '0')
redis.call('ZADD', KEYS[3], id, id)
return id
"#;

/// KEYS: record key, new path key. ARGV: id, path, url, last_updated,
/// path prefix. Returns 1 on success, 0 when the path belongs to another
/// redirect, -1 when the record is missing or inactive.
const UPDATE_SCRIPT: &str = r#"
local old = redis.call('HGET', KEYS[1], 'path')
if not old or redis.call('HGET', KEYS[1], 'inactive') == '1' then
  return -1
end
if old ~= ARGV[2] then
  if redis.call('SETNX', KEYS[2], ARGV[1]) == 0 then
    return 0
  end
  redis.call('DEL', ARGV[5] .. old)
end
redis.call('HSET', KEYS[1], 'path', ARGV[2], 'url', ARGV[3], 'last_updated', ARGV[4])
return 1
"#;

/// Redirect table stored in Redis hashes.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    create_script: Script,
    update_script: Script,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            create_script: Script::new(CREATE_SCRIPT),
            update_script: Script::new(UPDATE_SCRIPT),
        }
    }

    async fn load(&self, id: u64) -> Result<Option<Redirect>, StoreError> {
        let mut conn = self.conn.clone();
        let map: HashMap<String, String> = conn.hgetall(record_key(id)).await?;
        if map.is_empty() {
            return Ok(None);
        }
        redirect_from_map(&map).map(Some)
    }

    /// Loads every id in one pipelined round trip, skipping missing records.
    async fn load_many(&self, ids: &[u64]) -> Result<Vec<Redirect>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = ::redis::pipe();
        for id in ids {
            pipe.hgetall(record_key(*id));
        }
        let mut conn = self.conn.clone();
        let maps: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;
        maps.iter()
            .filter(|m| !m.is_empty())
            .map(redirect_from_map)
            .collect()
    }

    async fn id_for_path(&self, path: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(path_key(path)).await?)
    }

    async fn load_all(&self) -> Result<Vec<Redirect>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<u64> = conn.zrange(INDEX_KEY, 0, -1).await?;
        self.load_many(&ids).await
    }

    async fn write_fields(&self, id: u64, fields: &[(&str, String)]) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset_multiple(record_key(id), fields).await?;
        Ok(())
    }
}

#[async_trait]
impl Resolver for RedisStore {
    async fn resolve(&self, path: &str) -> Result<Option<String>, StoreError> {
        let Some(id) = self.id_for_path(path).await? else {
            return Ok(None);
        };
        Ok(self
            .load(id)
            .await?
            .filter(|r| !r.inactive)
            .map(|r| r.url))
    }
}

#[async_trait]
impl RedirectStore for RedisStore {
    async fn create(&self, path: &str, url: &str) -> Result<Redirect, StoreError> {
        let mut conn = self.conn.clone();
        let last_updated = now_timestamp();
        let id: u64 = self
            .create_script
            .key(path_key(path))
            .key(SEQ_KEY)
            .key(INDEX_KEY)
            .arg(path)
            .arg(url)
            .arg(&last_updated)
            .arg(RECORD_PREFIX)
            .invoke_async(&mut conn)
            .await?;
        if id == 0 {
            return Err(StoreError::Duplicate(path.to_string()));
        }

        Ok(Redirect {
            id,
            path: path.to_string(),
            url: url.to_string(),
            last_updated,
            inactive: false,
        })
    }

    async fn get_by_id(&self, id: u64) -> Result<Option<Redirect>, StoreError> {
        self.load(id).await
    }

    async fn fix(&self, path: &str, url: &str) -> Result<Redirect, StoreError> {
        let id = self.id_for_path(path).await?.ok_or(StoreError::NotFound)?;
        let mut redirect = self
            .load(id)
            .await?
            .filter(|r| !r.inactive)
            .ok_or(StoreError::NotFound)?;

        redirect.url = url.to_string();
        redirect.last_updated = now_timestamp();
        self.write_fields(
            id,
            &[
                ("url", redirect.url.clone()),
                ("last_updated", redirect.last_updated.clone()),
            ],
        )
        .await?;
        Ok(redirect)
    }

    async fn update(&self, id: u64, path: &str, url: &str) -> Result<Redirect, StoreError> {
        let mut conn = self.conn.clone();
        let outcome: i64 = self
            .update_script
            .key(record_key(id))
            .key(path_key(path))
            .arg(id)
            .arg(path)
            .arg(url)
            .arg(now_timestamp())
            .arg(PATH_PREFIX)
            .invoke_async(&mut conn)
            .await?;
        match outcome {
            1 => self.load(id).await?.ok_or(StoreError::NotFound),
            0 => Err(StoreError::Duplicate(path.to_string())),
            _ => Err(StoreError::NotFound),
        }
    }

    async fn disable(&self, id: u64) -> Result<Redirect, StoreError> {
        let mut redirect = self
            .load(id)
            .await?
            .filter(|r| !r.inactive)
            .ok_or(StoreError::NotFound)?;

        redirect.inactive = true;
        redirect.last_updated = now_timestamp();
        self.write_fields(
            id,
            &[
                ("inactive", "1".to_string()),
                ("last_updated", redirect.last_updated.clone()),
            ],
        )
        .await?;
        Ok(redirect)
    }

    async fn list(&self, after: u64) -> Result<Vec<Redirect>, StoreError> {
        let mut conn = self.conn.clone();
        let upper = after.saturating_add(PAGE_LIMIT as u64);
        let ids: Vec<u64> = conn
            .zrangebyscore(INDEX_KEY, format!("({after}"), upper)
            .await?;
        self.load_many(&ids).await
    }

    async fn search_path(&self, needle: &str, offset: usize) -> Result<Vec<Redirect>, StoreError> {
        let needle = needle.to_lowercase();
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .filter(|r| !r.inactive && r.path.to_lowercase().contains(&needle))
            .skip(offset)
            .take(PAGE_LIMIT)
            .collect())
    }

    async fn destination_exists(&self, url: &str) -> Result<bool, StoreError> {
        Ok(self.load_all().await?.iter().any(|r| r.url == url))
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

fn redirect_from_map(map: &HashMap<String, String>) -> Result<Redirect, StoreError> {
    let field = |name: &str| {
        map.get(name)
            .cloned()
            .ok_or_else(|| StoreError::Corrupt(format!("missing field '{name}'")))
    };
    let id = field("id")?
        .parse()
        .map_err(|_| StoreError::Corrupt("non-numeric id".into()))?;

    Ok(Redirect {
        id,
        path: field("path")?,
        url: field("url")?,
        last_updated: map.get("last_updated").cloned().unwrap_or_default(),
        inactive: map.get("inactive").map(|v| v == "1").unwrap_or(false),
    })
}
