//! Scripted crawl session.
//!
//! The "crawl" is a timeline of status changes played while the real
//! extraction request is in flight. Only the final transition depends on
//! the request: success when it resolves, failure when it errors.

use chrono::{DateTime, Local};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use url::Url;

use crate::error::{HarvestError, Result};
use crate::model::ProductRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Idle,
    Connecting,
    Challenge,
    Rendering,
    Success,
    Failure,
}

impl CrawlPhase {
    pub fn name(self) -> &'static str {
        match self {
            CrawlPhase::Idle => "idle",
            CrawlPhase::Connecting => "connecting",
            CrawlPhase::Challenge => "challenge",
            CrawlPhase::Rendering => "rendering",
            CrawlPhase::Success => "success",
            CrawlPhase::Failure => "failure",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One line of the session's activity log
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
    pub level: LogLevel,
}

/// Delays between scripted steps
#[derive(Debug, Clone, Copy)]
pub struct SessionPacing {
    pub handshake: Duration,
    pub challenge: Duration,
    pub render: Duration,
}

impl Default for SessionPacing {
    fn default() -> Self {
        Self {
            handshake: Duration::from_millis(800),
            challenge: Duration::from_millis(1200),
            render: Duration::from_millis(2500),
        }
    }
}

impl SessionPacing {
    /// No delays at all
    pub fn instant() -> Self {
        Self {
            handshake: Duration::ZERO,
            challenge: Duration::ZERO,
            render: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub stealth_mode: bool,
    pub proxy_region: Option<String>,
    pub auto_captcha: bool,
    pub pacing: SessionPacing,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            stealth_mode: true,
            proxy_region: Some("美国 (US - Residential)".to_string()),
            auto_captcha: true,
            pacing: SessionPacing::default(),
        }
    }
}

/// Whether the URL is one the simulation treats as a dead target
pub fn simulates_not_found(url: &str) -> bool {
    url.contains("404") || url.contains("error")
}

#[derive(Debug)]
pub struct CrawlSession {
    phase: CrawlPhase,
    progress: u8,
    log: Vec<LogEntry>,
    options: SessionOptions,
}

impl CrawlSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            phase: CrawlPhase::Idle,
            progress: 0,
            log: Vec::new(),
            options,
        }
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    fn record(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => log::info!("{}", message),
            LogLevel::Warning => log::warn!("{}", message),
            LogLevel::Error => log::error!("{}", message),
        }
        self.log.push(LogEntry {
            timestamp: Local::now(),
            message,
            level,
        });
    }

    fn transition(&mut self, allowed: &[CrawlPhase], to: CrawlPhase) -> Result<()> {
        if !allowed.contains(&self.phase) {
            return Err(HarvestError::InvalidTransition {
                from: self.phase.name(),
                to: to.name(),
            });
        }
        log::debug!("Crawl phase {} -> {}", self.phase, to);
        self.phase = to;
        Ok(())
    }

    /// Idle -> Connecting; clears the previous run's log
    pub fn begin(&mut self, url: &str) -> Result<()> {
        self.transition(&[CrawlPhase::Idle], CrawlPhase::Connecting)?;
        self.log.clear();
        self.progress = 0;
        self.record(LogLevel::Info, format!("启动任务: {}", url));
        if self.options.stealth_mode {
            self.record(LogLevel::Warning, ">>> 隐身模式已激活 (Stealth Mode ON)");
        }
        if let Some(region) = self.options.proxy_region.clone() {
            self.record(LogLevel::Warning, format!(">>> 连接住宅代理池: {}", region));
        }
        Ok(())
    }

    pub fn handshake(&mut self) -> Result<()> {
        self.transition(&[CrawlPhase::Connecting], CrawlPhase::Connecting)?;
        self.record(LogLevel::Info, "正在进行 TLS 指纹握手...");
        self.progress = 10;
        Ok(())
    }

    /// Connecting -> Challenge
    pub fn challenge(&mut self) -> Result<()> {
        self.transition(&[CrawlPhase::Connecting], CrawlPhase::Challenge)?;
        if self.options.auto_captcha {
            self.record(LogLevel::Warning, "检测到安全盾 (Cloudflare/Akamai)...");
            self.record(LogLevel::Info, "正在尝试自动突破验证码...");
        } else {
            self.record(LogLevel::Info, "检测到安全盾...");
        }
        self.progress = 30;
        Ok(())
    }

    /// Challenge -> Rendering
    pub fn render(&mut self) -> Result<()> {
        self.transition(&[CrawlPhase::Challenge], CrawlPhase::Rendering)?;
        if self.options.auto_captcha {
            self.record(LogLevel::Success, "验证码突破成功！Access Granted.");
        }
        self.record(LogLevel::Info, "页面 DOM 渲染中...");
        if self.options.stealth_mode {
            self.record(LogLevel::Info, "模拟鼠标随机轨迹中...");
        }
        self.progress = 60;
        Ok(())
    }

    /// Rendering -> Success
    pub fn complete(&mut self, count: usize) -> Result<()> {
        self.transition(&[CrawlPhase::Rendering], CrawlPhase::Success)?;
        self.progress = 100;
        self.record(LogLevel::Success, format!("成功采集: 获取到 {} 条数据", count));
        Ok(())
    }

    /// Any running phase -> Failure
    pub fn fail(&mut self, reason: &str) -> Result<()> {
        self.transition(
            &[
                CrawlPhase::Connecting,
                CrawlPhase::Challenge,
                CrawlPhase::Rendering,
            ],
            CrawlPhase::Failure,
        )?;
        self.progress = 0;
        self.record(LogLevel::Error, format!("错误: {}", reason));
        Ok(())
    }

    /// Success/Failure -> Idle
    pub fn reset(&mut self) -> Result<()> {
        self.transition(
            &[CrawlPhase::Idle, CrawlPhase::Success, CrawlPhase::Failure],
            CrawlPhase::Idle,
        )?;
        self.progress = 0;
        Ok(())
    }

    async fn play_script(&mut self, dead_target: bool) -> Result<()> {
        let pacing = self.options.pacing;
        tokio::time::sleep(pacing.handshake).await;
        self.handshake()?;
        tokio::time::sleep(pacing.challenge).await;
        self.challenge()?;
        tokio::time::sleep(pacing.render).await;
        if dead_target {
            self.progress = 60;
            return Ok(());
        }
        self.render()?;
        self.record(LogLevel::Info, "开始提取 JSON-LD 结构化数据...");
        Ok(())
    }

    /// Play the scripted crawl of `url` alongside `extraction`.
    ///
    /// The extraction future is never polled for a blank URL or a simulated
    /// dead target, so no service call happens in those cases.
    pub async fn run<F>(&mut self, url: &str, extraction: F) -> Result<Vec<ProductRecord>>
    where
        F: Future<Output = Result<Vec<ProductRecord>>>,
    {
        let url = url.trim();
        if url.is_empty() {
            self.record(LogLevel::Error, "错误: 请输入有效的目标 URL");
            return Err(HarvestError::EmptyInput);
        }
        match Url::parse(url) {
            Ok(parsed) => log::debug!("Target host: {}", parsed.host_str().unwrap_or("-")),
            Err(e) => log::warn!("{} is not a valid URL ({}), using it as a keyword hint", url, e),
        }

        self.begin(url)?;

        if simulates_not_found(url) {
            self.play_script(true).await?;
            self.fail("目标页面返回 404 或链接已失效")?;
            return Err(HarvestError::TargetNotFound(url.to_string()));
        }

        let (script, outcome) = futures::future::join(self.play_script(false), extraction).await;
        script?;

        match outcome {
            Ok(records) => {
                self.complete(records.len())?;
                Ok(records)
            }
            Err(e) => {
                self.fail(&e.to_string())?;
                Err(e)
            }
        }
    }
}
