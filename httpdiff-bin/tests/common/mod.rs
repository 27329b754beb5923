#![allow(dead_code)]

use futures::future::{self, FutureExt};
use httpdiff::config::TaskConfig;
use httpdiff::request::Method;
use httpdiff_client::{ClientError, FutureResponse, Headers, HttpClient, RequestBody};
use serde_json::Value;
use slog::{o, Logger};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

pub const URL_A: &str = "http://a.test/x";
pub const URL_B: &str = "http://b.test/x";

#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Status(u16),
    Panic(&'static str),
    Delay(Duration, Value),
}

/// In-memory endpoint pair. The first route whose pattern occurs in the URL answers.
#[derive(Default)]
pub struct ScriptedClient {
    routes: Vec<(String, Reply)>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new() -> ScriptedClient {
        ScriptedClient::default()
    }

    pub fn route(mut self, pattern: &str, reply: Reply) -> ScriptedClient {
        self.routes.push((pattern.to_string(), reply));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn reply(&self, url: &str) -> FutureResponse<Value, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .routes
            .iter()
            .find(|(pattern, _)| url.contains(pattern.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or(Reply::Status(404));
        match reply {
            Reply::Json(v) => future::ok(v).boxed(),
            Reply::Status(code) => future::err(ClientError::Status(code)).boxed(),
            Reply::Panic(message) => panic!("{}", message),
            Reply::Delay(d, v) => async move {
                tokio::time::sleep(d).await;
                Ok(v)
            }
            .boxed(),
        }
    }
}

impl HttpClient for ScriptedClient {
    fn get(&self, url: &str, _headers: &Headers) -> FutureResponse<Value, ClientError> {
        self.reply(url)
    }

    fn post(
        &self,
        url: &str,
        _body: RequestBody,
        _headers: &Headers,
    ) -> FutureResponse<Value, ClientError> {
        self.reply(url)
    }
}

pub fn logger() -> Logger {
    Logger::root(slog::Discard, o!())
}

/// A temporary work directory holding payload files and task output.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Workspace {
        Workspace {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn payload(&self, name: &str, lines: &[&str]) -> String {
        let mut contents = lines.join("\n");
        contents.push('\n');
        std::fs::write(self.dir.path().join(name), contents).unwrap();
        name.to_string()
    }

    pub fn task(&self, name: &str, files: Vec<String>) -> TaskConfig {
        let mut c = TaskConfig::new(
            name,
            self.dir.path().to_path_buf(),
            files,
            URL_A,
            URL_B,
            Method::Get,
        );
        c.warm_up = Duration::from_millis(0);
        c.concurrency = 4;
        c
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn records(&self, name: &str) -> Vec<Value> {
        std::fs::read_to_string(self.file(name))
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }
}

pub fn line(params: &str) -> String {
    serde_json::json!({"params": params, "headers": "", "body": ""}).to_string()
}
