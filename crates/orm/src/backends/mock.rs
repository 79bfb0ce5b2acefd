//! Scripted in-memory driver
//!
//! Answers statements from rules matched by SQL substring and records every
//! statement it receives. Used by the crate's own tests and handy for
//! applications that want to test model code without a server.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::core::{DatabaseDriver, ExecOutcome, Row};
use crate::error::{ModelError, ModelResult};
use crate::value::Value;

/// A statement as received by the driver
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone)]
enum Response {
    Rows(Vec<Row>),
    Outcome(ExecOutcome),
    Fail(String),
}

#[derive(Debug, Clone)]
struct Rule {
    fragment: String,
    response: Response,
    /// Remaining uses; `None` means unlimited
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct MockState {
    query_rules: Vec<Rule>,
    execute_rules: Vec<Rule>,
    log: Vec<LoggedStatement>,
    closed: bool,
}

/// Driver returning scripted results
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every SELECT containing `fragment` with `rows`
    pub fn on_query(&self, fragment: impl Into<String>, rows: Vec<Row>) -> &Self {
        self.push_query(fragment.into(), Response::Rows(rows), None)
    }

    /// Answer the next SELECT containing `fragment` with `rows`, once
    pub fn on_query_once(&self, fragment: impl Into<String>, rows: Vec<Row>) -> &Self {
        self.push_query(fragment.into(), Response::Rows(rows), Some(1))
    }

    /// Answer every write containing `fragment` with `outcome`
    pub fn on_execute(&self, fragment: impl Into<String>, outcome: ExecOutcome) -> &Self {
        self.push_execute(fragment.into(), Response::Outcome(outcome))
    }

    /// Make every statement containing `fragment` fail with `message`
    pub fn fail_on(&self, fragment: impl Into<String>, message: impl Into<String>) -> &Self {
        let fragment = fragment.into();
        let message = message.into();
        self.push_query(fragment.clone(), Response::Fail(message.clone()), None);
        self.push_execute(fragment, Response::Fail(message))
    }

    fn push_query(&self, fragment: String, response: Response, remaining: Option<usize>) -> &Self {
        if let Ok(mut state) = self.state.lock() {
            state.query_rules.push(Rule {
                fragment,
                response,
                remaining,
            });
        }
        self
    }

    fn push_execute(&self, fragment: String, response: Response) -> &Self {
        if let Ok(mut state) = self.state.lock() {
            state.execute_rules.push(Rule {
                fragment,
                response,
                remaining: None,
            });
        }
        self
    }

    /// Every statement received so far, in order
    pub fn statements(&self) -> Vec<LoggedStatement> {
        self.state.lock().map(|s| s.log.clone()).unwrap_or_default()
    }

    /// Statements whose SQL starts with `prefix` (case-insensitive)
    pub fn statements_starting_with(&self, prefix: &str) -> Vec<LoggedStatement> {
        let prefix = prefix.to_ascii_uppercase();
        self.statements()
            .into_iter()
            .filter(|s| s.sql.trim_start().to_ascii_uppercase().starts_with(&prefix))
            .collect()
    }

    /// Forget logged statements, keeping the rules
    pub fn clear_log(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.log.clear();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|s| s.closed).unwrap_or(false)
    }

    fn respond(&self, sql: &str, params: &[Value], writes: bool) -> ModelResult<Response> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ModelError::Connection("mock driver state poisoned".to_string()))?;
        if state.closed {
            return Err(ModelError::Connection("mock driver is closed".to_string()));
        }
        state.log.push(LoggedStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });

        let rules = if writes {
            &mut state.execute_rules
        } else {
            &mut state.query_rules
        };
        // newest matching rule wins
        let matched = rules
            .iter_mut()
            .rev()
            .find(|rule| sql.contains(&rule.fragment) && rule.remaining != Some(0));

        Ok(match matched {
            Some(rule) => {
                if let Some(remaining) = rule.remaining.as_mut() {
                    *remaining -= 1;
                }
                rule.response.clone()
            }
            None if writes => Response::Outcome(ExecOutcome::default()),
            None => Response::Rows(Vec::new()),
        })
    }
}

#[async_trait]
impl DatabaseDriver for MockDriver {
    async fn fetch_all(&self, sql: &str, params: &[Value]) -> ModelResult<Vec<Row>> {
        match self.respond(sql, params, false)? {
            Response::Rows(rows) => Ok(rows),
            Response::Outcome(_) => Ok(Vec::new()),
            Response::Fail(message) => Err(ModelError::statement(sql, &params, message)),
        }
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> ModelResult<ExecOutcome> {
        match self.respond(sql, params, true)? {
            Response::Outcome(outcome) => Ok(outcome),
            Response::Rows(rows) => Ok(ExecOutcome::affected(rows.len() as u64)),
            Response::Fail(message) => Err(ModelError::statement(sql, &params, message)),
        }
    }

    async fn close(&self) -> ModelResult<()> {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_newest_rule_wins_and_once_rules_expire() {
        let driver = MockDriver::new();
        driver.on_query("FROM `users`", vec![Row::from_pairs([("id", 1)])]);
        driver.on_query_once("FROM `users`", vec![Row::from_pairs([("id", 2)])]);

        let first = driver.fetch_all("SELECT * FROM `users`", &[]).await.unwrap();
        let second = driver.fetch_all("SELECT * FROM `users`", &[]).await.unwrap();
        assert_eq!(first[0].get("id"), Some(&Value::Int(2)));
        assert_eq!(second[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(driver.statements().len(), 2);
    }

    #[tokio::test]
    async fn test_failures_and_defaults() {
        let driver = MockDriver::new();
        driver.fail_on("bogus", "syntax error");
        assert!(driver.execute("UPDATE bogus SET a = ?", &[Value::Int(1)]).await.is_err());
        assert_eq!(
            driver.execute("DELETE FROM `x`", &[]).await.unwrap(),
            ExecOutcome::default()
        );
        assert_eq!(driver.statements_starting_with("delete").len(), 1);

        driver.close().await.unwrap();
        assert!(driver.is_closed());
        assert!(driver.fetch_all("SELECT 1", &[]).await.is_err());
    }
}
