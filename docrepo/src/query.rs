//! 查询参数转换
//!
//! 将位置参数（`?`）转换为存储原生的命名参数（`@param0`、`@param1`……），
//! 并按出现顺序改写查询文本。
//!
use crate::error::{RepoError, RepoResult as Result};
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 位置占位符
pub const PLACEHOLDER: char = '?';

/// 命名参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    pub value: Value,
}

/// 交给存储执行的查询
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SqlQuerySpec {
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<QueryParameter>,
}

impl SqlQuerySpec {
    /// 无参数查询
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: Vec::new(),
        }
    }

    /// 由位置参数构造：生成命名参数并改写占位符
    pub fn positional(query: &str, values: &[Value]) -> Result<Self> {
        let parameters = to_named_parameters(values);
        let query = rewrite_query(query, &parameters)?;
        Ok(Self { query, parameters })
    }

    /// 查找命名参数的值
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

/// 查询执行提示（性能相关，不影响语义）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct FeedOptions {
    #[builder(default = true)]
    pub enable_cross_partition_query: bool,
    /// -1 表示不限制
    #[builder(default = -1)]
    pub max_degree_of_parallelism: i32,
    /// -1 表示不限制
    #[builder(default = -1)]
    pub max_item_count: i32,
}

impl FeedOptions {
    /// 跨分区、并行度与分页均不限制
    pub fn optimized() -> Self {
        Self::builder().build()
    }
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self::optimized()
    }
}

/// 位置值 -> 命名参数，名称按下标确定，可重复生成
pub fn to_named_parameters(values: &[Value]) -> Vec<QueryParameter> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| QueryParameter {
            name: format!("@param{index}"),
            value: value.clone(),
        })
        .collect()
}

/// 按顺序将第 N 个占位符替换为第 N 个参数名
///
/// 引号内的 `?` 属于字面量，不参与替换。占位符与参数数量不一致时返回
/// `InvalidArgument`，不会静默截断。
pub fn rewrite_query(query: &str, parameters: &[QueryParameter]) -> Result<String> {
    let placeholders = count_placeholders(query);
    if placeholders != parameters.len() {
        return Err(RepoError::invalid_argument(format!(
            "query has {placeholders} placeholder(s) but {} parameter(s) were given",
            parameters.len()
        )));
    }

    let mut out = String::with_capacity(query.len() + parameters.len() * 8);
    let mut names = parameters.iter().map(|p| p.name.as_str());
    let mut quote: Option<char> = None;

    for ch in query.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => {
                quote = None;
                out.push(c);
            }
            (Some(_), c) => out.push(c),
            (None, '\'' | '"') => {
                quote = Some(ch);
                out.push(ch);
            }
            (None, PLACEHOLDER) => match names.next() {
                Some(name) => out.push_str(name),
                None => out.push(ch),
            },
            (None, c) => out.push(c),
        }
    }

    Ok(out)
}

fn count_placeholders(query: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut count = 0;
    for ch in query.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '\'' || ch == '"' => quote = Some(ch),
            None if ch == PLACEHOLDER => count += 1,
            None => {}
        }
    }
    count
}
