//! 内存版文档存储（MemoryStore）
//!
//! 满足 `store` 协议的进程内实现，用于测试、示例与本地开发：
//! - 创建时补全 `id`（uuid v4）、`_ts`（单调递增的逻辑时钟）与 `_etag`；
//! - 可为容器声明分区键路径（如 `/region`），替换/删除时校验分区值；
//! - 支持一个最小 SQL 子集：
//!   `SELECT [TOP n|@p] * FROM c [WHERE c.f <op> v [AND ...]] [ORDER BY c.f [ASC|DESC]]`；
//! - 支持一次性故障注入（`fail_next_delete_of`），用于验证批量操作的部分失败语义。
//!
//! 注意：`_ts` 在真实存储中是秒级时间戳，这里用逻辑时钟代替以保证排序确定。

use crate::{
    document::{Document, ID_KEY, TS_KEY},
    error::{RepoError, RepoResult as Result},
    query::{FeedOptions, SqlQuerySpec},
    store::{ContainerHandle, Connector, DocumentClient, DocumentDatabase},
};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use tokio::sync::Mutex;

/// 内存存储（克隆共享同一份数据）
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreState>,
}

#[derive(Default)]
struct StoreState {
    containers: DashMap<(String, String), Arc<ContainerState>>,
    partition_paths: DashMap<String, String>,
    clock: AtomicU64,
    opens: AtomicUsize,
    failing_deletes: Mutex<HashSet<String>>,
}

struct ContainerState {
    partition_path: Option<Vec<String>>,
    documents: Mutex<Vec<Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为容器声明分区键路径（例如 `/region`），需在首次打开容器前调用
    pub fn with_partition_key(self, container: &str, path: &str) -> Self {
        self.inner
            .partition_paths
            .insert(container.to_string(), path.to_string());
        self
    }

    /// 累计打开容器句柄的次数
    pub fn open_count(&self) -> usize {
        self.inner.opens.load(AtomicOrdering::SeqCst)
    }

    /// 令下一次删除指定 id 的调用以传输错误失败（仅生效一次）
    pub async fn fail_next_delete_of(&self, id: impl Into<String>) {
        self.inner.failing_deletes.lock().await.insert(id.into());
    }

    /// 直接读取某容器的全部文档（按插入顺序）
    pub async fn documents(&self, database: &str, container: &str) -> Vec<Document> {
        let key = (database.to_string(), container.to_string());
        let state = self.inner.containers.get(&key).map(|s| Arc::clone(&s));
        match state {
            Some(state) => state.documents.lock().await.clone(),
            None => Vec::new(),
        }
    }

    fn container_state(&self, database: &str, container: &str) -> Arc<ContainerState> {
        let key = (database.to_string(), container.to_string());
        let entry = self.inner.containers.entry(key).or_insert_with(|| {
            let partition_path = self
                .inner
                .partition_paths
                .get(container)
                .map(|p| split_path(p.value()));
            Arc::new(ContainerState {
                partition_path,
                documents: Mutex::new(Vec::new()),
            })
        });
        Arc::clone(entry.value())
    }

    fn tick(&self) -> u64 {
        self.inner.clock.fetch_add(1, AtomicOrdering::SeqCst) + 1
    }
}

impl Connector for MemoryStore {
    fn connect(&self, connection_string: &str) -> Result<Arc<dyn DocumentClient>> {
        if connection_string.trim().is_empty() {
            return Err(RepoError::configuration("empty connection string"));
        }
        Ok(Arc::new(self.clone()))
    }
}

impl DocumentClient for MemoryStore {
    fn database(&self, name: &str) -> Arc<dyn DocumentDatabase> {
        Arc::new(MemoryDatabase {
            store: self.clone(),
            name: name.to_string(),
        })
    }
}

/// 内存数据库句柄
pub struct MemoryDatabase {
    store: MemoryStore,
    name: String,
}

impl DocumentDatabase for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn container(&self, name: &str) -> Arc<dyn ContainerHandle> {
        self.store.inner.opens.fetch_add(1, AtomicOrdering::SeqCst);
        let state = self.store.container_state(&self.name, name);
        Arc::new(MemoryContainer {
            store: self.store.clone(),
            name: name.to_string(),
            state,
        })
    }
}

/// 内存容器句柄（每次打开都是新的代理，共享底层数据）
pub struct MemoryContainer {
    store: MemoryStore,
    name: String,
    state: Arc<ContainerState>,
}

impl MemoryContainer {
    fn check_partition(&self, document: &Document, partition: &Value) -> bool {
        match &self.state.partition_path {
            None => true,
            Some(path) => lookup(document, path).map_or(partition.is_null(), |v| v == partition),
        }
    }

    fn stamp(&self, document: &mut Document) {
        document.insert(TS_KEY.to_string(), Value::from(self.store.tick()));
        document.insert(
            "_etag".to_string(),
            Value::String(uuid::Uuid::new_v4().to_string()),
        );
    }
}

#[async_trait]
impl ContainerHandle for MemoryContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, spec: &SqlQuerySpec, _options: &FeedOptions) -> Result<Vec<Document>> {
        let select = parse_select(spec)?;
        let documents = self.state.documents.lock().await;

        let mut rows: Vec<Document> = documents
            .iter()
            .filter(|doc| select.conditions.iter().all(|c| c.matches(doc)))
            .cloned()
            .collect();

        if let Some((path, descending)) = &select.order_by {
            rows.sort_by(|a, b| {
                let ord = compare_for_sort(lookup(a, path), lookup(b, path));
                if *descending { ord.reverse() } else { ord }
            });
        }

        if let Some(top) = select.top {
            rows.truncate(top);
        }

        Ok(rows)
    }

    async fn read(&self, id: &str) -> Result<Document> {
        let documents = self.state.documents.lock().await;
        documents
            .iter()
            .find(|doc| doc_id(doc) == Some(id))
            .cloned()
            .ok_or_else(|| RepoError::not_found(format!("{}/{id}", self.name)))
    }

    async fn create(&self, mut document: Document) -> Result<Document> {
        let id = match document.get(ID_KEY) {
            None | Some(Value::Null) => uuid::Uuid::new_v4().to_string(),
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(other) => {
                return Err(RepoError::invalid_argument(format!(
                    "document id must be a non-empty string, got {other}"
                )));
            }
        };
        document.insert(ID_KEY.to_string(), Value::String(id.clone()));

        let mut documents = self.state.documents.lock().await;
        if documents.iter().any(|doc| doc_id(doc) == Some(id.as_str())) {
            return Err(RepoError::conflict(format!("{}/{id} already exists", self.name)));
        }
        self.stamp(&mut document);
        documents.push(document.clone());
        Ok(document)
    }

    async fn replace(&self, id: &str, partition: &Value, mut document: Document) -> Result<Document> {
        let mut documents = self.state.documents.lock().await;
        let slot = documents
            .iter_mut()
            .find(|doc| doc_id(doc) == Some(id) && self.check_partition(doc, partition))
            .ok_or_else(|| RepoError::not_found(format!("{}/{id} in partition {partition}", self.name)))?;

        document.insert(ID_KEY.to_string(), Value::String(id.to_string()));
        self.stamp(&mut document);
        *slot = document.clone();
        Ok(document)
    }

    async fn delete(&self, id: &str, partition: &Value) -> Result<()> {
        if self.store.inner.failing_deletes.lock().await.remove(id) {
            return Err(RepoError::transport(format!(
                "injected failure deleting {}/{id}",
                self.name
            )));
        }

        let mut documents = self.state.documents.lock().await;
        let position = documents
            .iter()
            .position(|doc| doc_id(doc) == Some(id) && self.check_partition(doc, partition))
            .ok_or_else(|| RepoError::not_found(format!("{}/{id} in partition {partition}", self.name)))?;
        documents.remove(position);
        Ok(())
    }
}

fn doc_id(document: &Document) -> Option<&str> {
    document.get(ID_KEY).and_then(Value::as_str)
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn lookup<'a>(document: &'a Document, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = document.get(first)?;
    for segment in rest {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

// -------- 查询子集 --------

#[derive(Debug)]
struct Select {
    top: Option<usize>,
    conditions: Vec<Condition>,
    order_by: Option<(Vec<String>, bool)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug)]
struct Condition {
    path: Vec<String>,
    op: Op,
    value: Value,
}

impl Condition {
    fn matches(&self, document: &Document) -> bool {
        let Some(actual) = lookup(document, &self.path) else {
            return false;
        };
        match self.op {
            Op::Eq => values_equal(actual, &self.value),
            Op::Ne => !values_equal(actual, &self.value),
            op => match compare_values(actual, &self.value) {
                Some(ord) => match op {
                    Op::Lt => ord == Ordering::Less,
                    Op::Le => ord != Ordering::Greater,
                    Op::Gt => ord == Ordering::Greater,
                    Op::Ge => ord != Ordering::Less,
                    Op::Eq | Op::Ne => false,
                },
                None => false,
            },
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// 缺失或无法比较的值排在最前
fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Number(Number),
    Str(String),
    Param(String),
    Symbol(&'static str),
}

fn unsupported(query: &str) -> RepoError {
    RepoError::invalid_argument(format!("unsupported query: {query}"))
}

fn tokenize(query: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = query.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '\'' || c == '"' {
            let end = chars[i + 1..]
                .iter()
                .position(|&x| x == c)
                .map(|p| i + 1 + p)
                .ok_or_else(|| unsupported(query))?;
            tokens.push(Token::Str(chars[i + 1..end].iter().collect()));
            i = end + 1;
        } else if c == '@' || c.is_alphabetic() || c == '_' {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if c == '@' {
                tokens.push(Token::Param(word));
            } else {
                tokens.push(Token::Word(word));
            }
        } else if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let number = serde_json::from_str::<Number>(&text).map_err(|_| unsupported(query))?;
            tokens.push(Token::Number(number));
        } else {
            let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
            let symbol = match two.as_str() {
                "!=" => Some("!="),
                "<>" => Some("!="),
                "<=" => Some("<="),
                ">=" => Some(">="),
                _ => None,
            };
            if let Some(symbol) = symbol {
                tokens.push(Token::Symbol(symbol));
                i += 2;
                continue;
            }
            let symbol = match c {
                '*' => "*",
                '=' => "=",
                '<' => "<",
                '>' => ">",
                ',' => ",",
                _ => return Err(unsupported(query)),
            };
            tokens.push(Token::Symbol(symbol));
            i += 1;
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    spec: &'a SqlQuerySpec,
    tokens: Vec<Token>,
    pos: usize,
    alias: String,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn keyword(&mut self, kw: &str) -> bool {
        match self.peek() {
            Some(Token::Word(w)) if w.eq_ignore_ascii_case(kw) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<()> {
        if self.keyword(kw) {
            Ok(())
        } else {
            Err(unsupported(&self.spec.query))
        }
    }

    fn value(&mut self) -> Result<Value> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Value::Number(n)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Param(name)) => self.spec.parameter(&name).cloned().ok_or_else(|| {
                RepoError::invalid_argument(format!("unbound query parameter {name}"))
            }),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("null") => Ok(Value::Null),
            _ => Err(unsupported(&self.spec.query)),
        }
    }

    fn path(&mut self) -> Result<Vec<String>> {
        let Some(Token::Word(word)) = self.next() else {
            return Err(unsupported(&self.spec.query));
        };
        let mut segments = word.split('.');
        if segments.next() != Some(self.alias.as_str()) {
            return Err(unsupported(&self.spec.query));
        }
        let path: Vec<String> = segments.map(str::to_string).collect();
        if path.is_empty() {
            return Err(unsupported(&self.spec.query));
        }
        Ok(path)
    }

    fn op(&mut self) -> Result<Op> {
        match self.next() {
            Some(Token::Symbol("=")) => Ok(Op::Eq),
            Some(Token::Symbol("!=")) => Ok(Op::Ne),
            Some(Token::Symbol("<")) => Ok(Op::Lt),
            Some(Token::Symbol("<=")) => Ok(Op::Le),
            Some(Token::Symbol(">")) => Ok(Op::Gt),
            Some(Token::Symbol(">=")) => Ok(Op::Ge),
            _ => Err(unsupported(&self.spec.query)),
        }
    }
}

fn parse_select(spec: &SqlQuerySpec) -> Result<Select> {
    let mut p = Parser {
        spec,
        tokens: tokenize(&spec.query)?,
        pos: 0,
        alias: String::new(),
    };

    p.expect_keyword("SELECT")?;

    let top = if p.keyword("TOP") {
        let n = p.value()?;
        let n = n
            .as_u64()
            .filter(|n| *n > 0)
            .ok_or_else(|| RepoError::invalid_argument(format!("TOP expects a positive integer, got {n}")))?;
        Some(usize::try_from(n).unwrap_or(usize::MAX))
    } else {
        None
    };

    if p.next() != Some(Token::Symbol("*")) {
        return Err(unsupported(&spec.query));
    }
    p.expect_keyword("FROM")?;
    p.alias = match p.next() {
        Some(Token::Word(alias)) if !alias.contains('.') => alias,
        _ => return Err(unsupported(&spec.query)),
    };

    let mut conditions = Vec::new();
    if p.keyword("WHERE") {
        loop {
            let path = p.path()?;
            let op = p.op()?;
            let value = p.value()?;
            conditions.push(Condition { path, op, value });
            if !p.keyword("AND") {
                break;
            }
        }
    }

    let mut order_by = None;
    if p.keyword("ORDER") {
        p.expect_keyword("BY")?;
        let path = p.path()?;
        let descending = if p.keyword("DESC") {
            true
        } else {
            p.keyword("ASC");
            false
        };
        order_by = Some((path, descending));
    }

    if p.peek().is_some() {
        return Err(unsupported(&spec.query));
    }

    Ok(Select {
        top,
        conditions,
        order_by,
    })
}
