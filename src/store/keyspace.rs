//! Key-value structures backing the reference store.
//!
//! The keyspace models the five value kinds the transaction scripts need:
//! strings (and counters), hashes, sets, sorted sets and lists. Empty
//! containers are removed, so a key exists only while it holds data.
//!
//! All access goes through a [`Transaction`], which records how to reverse
//! each write and unwinds them unless committed.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use super::Channel;
use crate::error::{Error, Result};

/// A stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
    SortedSet(SortedSet),
    List(VecDeque<String>),
}

impl Value {
    fn is_empty(&self) -> bool {
        match self {
            Value::Str(_) => false,
            Value::Hash(h) => h.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::SortedSet(z) => z.is_empty(),
            Value::List(l) => l.is_empty(),
        }
    }
}

/// Members ordered by `(score, insertion sequence)`.
///
/// Equal scores pop in the order they were added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortedSet {
    order: BTreeMap<(i64, u64), String>,
    members: HashMap<String, (i64, u64)>,
    next_seq: u64,
}

impl SortedSet {
    /// Insert or rescore a member. Returns true if the member is new.
    pub fn insert(&mut self, member: &str, score: i64) -> bool {
        if let Some(&(old_score, seq)) = self.members.get(member) {
            if old_score != score {
                self.order.remove(&(old_score, seq));
                self.order.insert((score, seq), member.to_string());
                self.members.insert(member.to_string(), (score, seq));
            }
            return false;
        }
        let key = (score, self.next_seq);
        self.next_seq += 1;
        self.order.insert(key, member.to_string());
        self.members.insert(member.to_string(), key);
        true
    }

    pub fn remove(&mut self, member: &str) -> bool {
        match self.members.remove(member) {
            Some(key) => {
                self.order.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Remove and return the lowest-scored member whose score is at most `max_score`.
    pub fn pop_min(&mut self, max_score: Option<i64>) -> Option<(String, i64)> {
        let (&key, _) = self.order.iter().next()?;
        if max_score.is_some_and(|max| key.0 > max) {
            return None;
        }
        let member = self.order.remove(&key)?;
        self.members.remove(&member);
        Some((member, key.0))
    }

    pub fn score(&self, member: &str) -> Option<i64> {
        self.members.get(member).map(|&(score, _)| score)
    }

    pub fn members(&self) -> Vec<String> {
        self.order.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn position(&self, member: &str) -> Option<(i64, u64)> {
        self.members.get(member).copied()
    }

    fn head(&self) -> Option<(&String, (i64, u64))> {
        self.order.iter().next().map(|(&key, member)| (member, key))
    }

    /// Put `member` back at an exact position, or drop it.
    fn restore(&mut self, member: &str, position: Option<(i64, u64)>) {
        self.remove(member);
        if let Some(key) = position {
            self.order.insert(key, member.to_string());
            self.members.insert(member.to_string(), key);
        }
    }
}

/// The complete keyspace.
#[derive(Debug, Default)]
pub struct Keyspace {
    data: HashMap<String, Value>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn prune(&mut self, key: &str) {
        if self.data.get(key).is_some_and(Value::is_empty) {
            self.data.remove(key);
        }
    }

    fn container(&mut self, key: &str, default: impl FnOnce() -> Value) -> &mut Value {
        self.data.entry(key.to_string()).or_insert_with(default)
    }

    fn undo(&mut self, step: Undo) {
        let key = match step {
            Undo::Key(key, Some(value)) => {
                self.data.insert(key, value);
                return;
            }
            Undo::Key(key, None) => {
                self.data.remove(&key);
                return;
            }
            Undo::Field { key, field, prior } => {
                if let Value::Hash(h) = self.container(&key, || Value::Hash(BTreeMap::new())) {
                    match prior {
                        Some(value) => h.insert(field, value),
                        None => h.remove(&field),
                    };
                }
                key
            }
            Undo::Member {
                key,
                member,
                present,
            } => {
                if let Value::Set(s) = self.container(&key, || Value::Set(BTreeSet::new())) {
                    if present {
                        s.insert(member);
                    } else {
                        s.remove(&member);
                    }
                }
                key
            }
            Undo::Scored {
                key,
                member,
                position,
            } => {
                if let Value::SortedSet(z) =
                    self.container(&key, || Value::SortedSet(SortedSet::default()))
                {
                    z.restore(&member, position);
                }
                key
            }
            Undo::PopFront(key) => {
                if let Some(Value::List(l)) = self.data.get_mut(&key) {
                    l.pop_front();
                }
                key
            }
            Undo::PopBack(key) => {
                if let Some(Value::List(l)) = self.data.get_mut(&key) {
                    l.pop_back();
                }
                key
            }
            Undo::PushBack(key, value) => {
                if let Value::List(l) = self.container(&key, || Value::List(VecDeque::new())) {
                    l.push_back(value);
                }
                key
            }
        };
        self.prune(&key);
    }
}

/// The inverse of one write.
///
/// Member-level writes record only the member they changed. `set`, `del`
/// and `lrem` record the whole prior value, so deleting or filtering a
/// large key costs a copy of it.
#[derive(Debug)]
enum Undo {
    Key(String, Option<Value>),
    Field {
        key: String,
        field: String,
        prior: Option<String>,
    },
    Member {
        key: String,
        member: String,
        present: bool,
    },
    Scored {
        key: String,
        member: String,
        position: Option<(i64, u64)>,
    },
    PopFront(String),
    PopBack(String),
    PushBack(String, String),
}

fn wrong_type(key: &str, expected: &'static str) -> Error {
    Error::WrongType {
        key: key.to_string(),
        expected,
    }
}

/// Exclusive, journaled access to a [`Keyspace`].
///
/// Writes apply immediately so later reads in the same script observe them.
/// Dropping the transaction without [`Transaction::commit`] replays the
/// journal backwards and discards buffered notifications.
pub struct Transaction<'a> {
    space: &'a mut Keyspace,
    journal: Vec<Undo>,
    published: Vec<Channel>,
    committed: bool,
}

impl<'a> Transaction<'a> {
    pub fn new(space: &'a mut Keyspace) -> Self {
        Self {
            space,
            journal: Vec::new(),
            published: Vec::new(),
            committed: false,
        }
    }

    /// Keep all writes and hand back the notifications to deliver.
    pub fn commit(mut self) -> Vec<Channel> {
        self.committed = true;
        self.journal.clear();
        std::mem::take(&mut self.published)
    }

    fn value(&self, key: &str) -> Option<&Value> {
        self.space.data.get(key)
    }

    // ---------- keys ----------

    pub fn exists(&self, key: &str) -> bool {
        self.space.data.contains_key(key)
    }

    pub fn del(&mut self, key: &str) -> bool {
        let Some(prior) = self.space.data.remove(key) else {
            return false;
        };
        self.journal.push(Undo::Key(key.to_string(), Some(prior)));
        true
    }

    pub fn publish(&mut self, channel: Channel) {
        self.published.push(channel);
    }

    // ---------- strings and counters ----------

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key, "string")),
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        if let Some(v) = self.value(key) {
            if !matches!(v, Value::Str(_)) {
                return Err(wrong_type(key, "string"));
            }
        }
        let prior = self
            .space
            .data
            .insert(key.to_string(), Value::Str(value.into()));
        self.journal.push(Undo::Key(key.to_string(), prior));
        Ok(())
    }

    pub fn incr_by(&mut self, key: &str, delta: i64) -> Result<i64> {
        let current = match self.get(key)? {
            None => 0,
            Some(s) => s.parse::<i64>().map_err(|_| Error::Corrupt {
                key: key.to_string(),
                detail: format!("'{}' is not an integer", s),
            })?,
        };
        let next = current + delta;
        self.set(key, next.to_string())?;
        Ok(next)
    }

    pub fn incr(&mut self, key: &str) -> Result<i64> {
        self.incr_by(key, 1)
    }

    pub fn decr(&mut self, key: &str) -> Result<i64> {
        self.incr_by(key, -1)
    }

    // ---------- hashes ----------

    fn hash(&self, key: &str) -> Result<Option<&BTreeMap<String, String>>> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(Some(h)),
            Some(_) => Err(wrong_type(key, "hash")),
        }
    }

    fn hash_mut(&mut self, key: &str) -> Result<&mut BTreeMap<String, String>> {
        match self.space.container(key, || Value::Hash(BTreeMap::new())) {
            Value::Hash(h) => Ok(h),
            _ => Err(wrong_type(key, "hash")),
        }
    }

    pub fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self.hash(key)?.and_then(|h| h.get(field).cloned()))
    }

    pub fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.hash(key)?.cloned().unwrap_or_default())
    }

    pub fn hset(&mut self, key: &str, field: &str, value: impl Into<String>) -> Result<()> {
        self.hash(key)?;
        let prior = self.hash_mut(key)?.insert(field.to_string(), value.into());
        self.journal.push(Undo::Field {
            key: key.to_string(),
            field: field.to_string(),
            prior,
        });
        Ok(())
    }

    pub fn hdel(&mut self, key: &str, field: &str) -> Result<bool> {
        if !self.hash(key)?.is_some_and(|h| h.contains_key(field)) {
            return Ok(false);
        }
        let prior = self.hash_mut(key)?.remove(field);
        self.space.prune(key);
        let removed = prior.is_some();
        self.journal.push(Undo::Field {
            key: key.to_string(),
            field: field.to_string(),
            prior,
        });
        Ok(removed)
    }

    // ---------- sets ----------

    fn set_ref(&self, key: &str) -> Result<Option<&BTreeSet<String>>> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Set(s)) => Ok(Some(s)),
            Some(_) => Err(wrong_type(key, "set")),
        }
    }

    fn set_mut(&mut self, key: &str) -> Result<&mut BTreeSet<String>> {
        match self.space.container(key, || Value::Set(BTreeSet::new())) {
            Value::Set(s) => Ok(s),
            _ => Err(wrong_type(key, "set")),
        }
    }

    pub fn sadd(&mut self, key: &str, member: &str) -> Result<bool> {
        self.set_ref(key)?;
        let added = self.set_mut(key)?.insert(member.to_string());
        if added {
            self.journal.push(Undo::Member {
                key: key.to_string(),
                member: member.to_string(),
                present: false,
            });
        }
        Ok(added)
    }

    pub fn srem(&mut self, key: &str, member: &str) -> Result<bool> {
        if !self.sismember(key, member)? {
            return Ok(false);
        }
        let removed = self.set_mut(key)?.remove(member);
        self.space.prune(key);
        if removed {
            self.journal.push(Undo::Member {
                key: key.to_string(),
                member: member.to_string(),
                present: true,
            });
        }
        Ok(removed)
    }

    pub fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self.set_ref(key)?.is_some_and(|s| s.contains(member)))
    }

    pub fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .set_ref(key)?
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    pub fn scard(&self, key: &str) -> Result<usize> {
        Ok(self.set_ref(key)?.map_or(0, BTreeSet::len))
    }

    /// Move a member between sets. Returns false if it was not in `source`.
    pub fn smove(&mut self, source: &str, destination: &str, member: &str) -> Result<bool> {
        self.set_ref(destination)?;
        if !self.srem(source, member)? {
            return Ok(false);
        }
        self.sadd(destination, member)?;
        Ok(true)
    }

    // ---------- sorted sets ----------

    fn zset_ref(&self, key: &str) -> Result<Option<&SortedSet>> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::SortedSet(z)) => Ok(Some(z)),
            Some(_) => Err(wrong_type(key, "sorted set")),
        }
    }

    fn zset_mut(&mut self, key: &str) -> Result<&mut SortedSet> {
        match self
            .space
            .container(key, || Value::SortedSet(SortedSet::default()))
        {
            Value::SortedSet(z) => Ok(z),
            _ => Err(wrong_type(key, "sorted set")),
        }
    }

    fn scored(&mut self, key: &str, member: &str, position: Option<(i64, u64)>) {
        self.journal.push(Undo::Scored {
            key: key.to_string(),
            member: member.to_string(),
            position,
        });
    }

    pub fn zadd(&mut self, key: &str, member: &str, score: i64) -> Result<bool> {
        let position = self.zset_ref(key)?.and_then(|z| z.position(member));
        let added = self.zset_mut(key)?.insert(member, score);
        self.scored(key, member, position);
        Ok(added)
    }

    pub fn zrem(&mut self, key: &str, member: &str) -> Result<bool> {
        let Some(position) = self.zset_ref(key)?.and_then(|z| z.position(member)) else {
            return Ok(false);
        };
        self.zset_mut(key)?.remove(member);
        self.space.prune(key);
        self.scored(key, member, Some(position));
        Ok(true)
    }

    pub fn zpopmin(&mut self, key: &str, max_score: Option<i64>) -> Result<Option<(String, i64)>> {
        let Some(position) = self.zset_ref(key)?.and_then(SortedSet::head).map(|(_, p)| p) else {
            return Ok(None);
        };
        let popped = self.zset_mut(key)?.pop_min(max_score);
        self.space.prune(key);
        if let Some((member, _)) = &popped {
            let member = member.clone();
            self.scored(key, &member, Some(position));
        }
        Ok(popped)
    }

    pub fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>> {
        Ok(self.zset_ref(key)?.and_then(|z| z.score(member)))
    }

    /// Members in pop order.
    pub fn zrange(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.zset_ref(key)?.map(SortedSet::members).unwrap_or_default())
    }

    // ---------- lists ----------

    fn list_ref(&self, key: &str) -> Result<Option<&VecDeque<String>>> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::List(l)) => Ok(Some(l)),
            Some(_) => Err(wrong_type(key, "list")),
        }
    }

    fn list_mut(&mut self, key: &str) -> Result<&mut VecDeque<String>> {
        self.list_ref(key)?;
        match self.space.container(key, || Value::List(VecDeque::new())) {
            Value::List(l) => Ok(l),
            _ => Err(wrong_type(key, "list")),
        }
    }

    pub fn lpush(&mut self, key: &str, value: impl Into<String>) -> Result<usize> {
        let list = self.list_mut(key)?;
        list.push_front(value.into());
        let len = list.len();
        self.journal.push(Undo::PopFront(key.to_string()));
        Ok(len)
    }

    pub fn rpush(&mut self, key: &str, value: impl Into<String>) -> Result<usize> {
        let list = self.list_mut(key)?;
        list.push_back(value.into());
        let len = list.len();
        self.journal.push(Undo::PopBack(key.to_string()));
        Ok(len)
    }

    pub fn rpop(&mut self, key: &str) -> Result<Option<String>> {
        if self.llen(key)? == 0 {
            return Ok(None);
        }
        let popped = self.list_mut(key)?.pop_back();
        self.space.prune(key);
        if let Some(value) = &popped {
            self.journal
                .push(Undo::PushBack(key.to_string(), value.clone()));
        }
        Ok(popped)
    }

    /// Remove every occurrence of `value`. Returns the number removed.
    pub fn lrem(&mut self, key: &str, value: &str) -> Result<usize> {
        let present = self
            .list_ref(key)?
            .map_or(0, |l| l.iter().filter(|v| v.as_str() == value).count());
        if present == 0 {
            return Ok(0);
        }
        let prior = self.space.data.get(key).cloned();
        self.list_mut(key)?.retain(|v| v != value);
        self.space.prune(key);
        self.journal.push(Undo::Key(key.to_string(), prior));
        Ok(present)
    }

    pub fn lrange(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .list_ref(key)?
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }

    pub fn llen(&self, key: &str) -> Result<usize> {
        Ok(self.list_ref(key)?.map_or(0, VecDeque::len))
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(step) = self.journal.pop() {
            self.space.undo(step);
        }
    }
}
