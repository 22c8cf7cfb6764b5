//! Extraction Request Builder.
//!
//! Turns pasted text or a URL plus an optional [`FilterConfig`] into one
//! schema-constrained request to the generative service, then hands the
//! parsed reply to the normalizer.

use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

use crate::error::{HarvestError, Result};
use crate::model::{CategoryFilter, FilterConfig, ProductRecord, RawProductRecord};
use crate::normalize::{normalize, parse_raw_batch};
use crate::service::{CompletionRequest, CompletionService};

const DEFAULT_CONTEXT: &str = "通用电商";

/// How the source text is treated by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Source is ground truth to extract from
    Text,
    /// Source is a URL hint to fabricate plausible matching records from
    UrlSimulation,
}

impl ExtractionMode {
    pub fn temperature(self) -> f32 {
        match self {
            ExtractionMode::Text => 0.1,
            ExtractionMode::UrlSimulation => 0.7,
        }
    }

    /// Provenance label stored in `raw_content` when the model gives none
    pub fn provenance(self, source: &str) -> String {
        match self {
            ExtractionMode::Text => "文本导入".to_string(),
            ExtractionMode::UrlSimulation => format!("爬取自: {}", source.trim()),
        }
    }

    pub fn failure_message(self) -> &'static str {
        match self {
            ExtractionMode::Text => "AI 数据采集服务连接失败，请检查网络或 API Key。",
            ExtractionMode::UrlSimulation => "云端爬虫节点响应超时，请重试。",
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMode::Text => f.write_str("text"),
            ExtractionMode::UrlSimulation => f.write_str("url-simulation"),
        }
    }
}

/// Response schema: an array of product objects, all string-typed
pub fn product_schema() -> Value {
    let field = |description: &str| json!({ "type": "STRING", "description": description });
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "productName": field("商品名称/标题"),
                "price": field("商品价格 (保留货币符号, 如 $15.99, ¥29.9)"),
                "salesVolume": field("销量数据 (如 10k+, 500)"),
                "productLink": field("商品详情页链接 URL"),
                "shopName": field("店铺/商家名称"),
                "shopLink": field("店铺主页链接 URL"),
                "rawContent": field("原始文本片段或来源标记"),
                "category": field("推断的商品类目"),
            },
            "required": ["productName", "price", "shopName", "rawContent"]
        }
    })
}

/// Hard-requirement clauses for every non-blank filter field
pub fn constraint_clauses(filters: &FilterConfig) -> Vec<String> {
    let mut clauses = Vec::new();
    if let CategoryFilter::Exact(category) = &filters.category {
        clauses.push(format!("商品类目必须属于: {}", category));
    }
    if let Some(min) = filters.min_price {
        clauses.push(format!("价格最低: ${}", min));
    }
    if let Some(max) = filters.max_price {
        clauses.push(format!("价格最高: ${}", max));
    }
    if let Some(sales) = filters.min_sales {
        clauses.push(format!("销量至少: {}", sales));
    }
    clauses
}

/// Compose the full instruction sent to the model
pub fn build_prompt(
    mode: ExtractionMode,
    source: &str,
    context_hint: &str,
    filters: Option<&FilterConfig>,
) -> String {
    let context = if context_hint.trim().is_empty() {
        DEFAULT_CONTEXT
    } else {
        context_hint.trim()
    };

    let mut prompt = match mode {
        ExtractionMode::Text => format!(
            "你是一名电商数据采集助手，负责从 TikTok/抖音 的非结构化文本中提取结构化商品信息。\n\
             类目/上下文: {context}\n\n\
             输入数据:\n\"\"\"\n{source}\n\"\"\"\n\n\
             提取规则:\n\
             1. 以输入数据为准，准确提取【商品名称】、【价格】、【销量】，不要编造文本中不存在的商品。\n\
             2. 文本中的 URL 作为商品链接或店铺链接。\n\
             3. 价格为区间时，提取最低价或保留区间写法。\n"
        ),
        ExtractionMode::UrlSimulation => format!(
            "你在模拟一个针对 TikTok/抖音 的商品爬虫。\n\
             类目/上下文: {context}\n\n\
             目标 URL:\n\"\"\"\n{source}\n\"\"\"\n\n\
             根据 URL 中的关键词（商品词、店铺名等），生成 3 到 6 条该页面可能展示的、看起来真实的商品数据。\n\
             生成要求:\n\
             1. 商品名称使用 TikTok 爆款风格（emoji、吸睛标题）。\n\
             2. 价格与销量要有差异（有爆款也有新品）。\n\
             3. URL 中含店铺名时沿用，否则按类目编造一个真实感的店铺名。\n\
             4. 链接使用虚拟的 tiktok.com 地址。\n"
        ),
    };

    if let Some(filters) = filters {
        let clauses = constraint_clauses(filters);
        if !clauses.is_empty() {
            prompt.push_str("\n用户设置了严格的筛选条件，所有输出必须满足:\n");
            for clause in clauses {
                prompt.push_str("- ");
                prompt.push_str(&clause);
                prompt.push('\n');
            }
        }
    }

    prompt.push_str("\n请直接返回符合 schema 的 JSON 数组。\n");
    prompt
}

/// Parse the model's reply text into raw records.
///
/// A blank reply is an empty batch; a ```json fence is tolerated.
pub fn parse_reply(text: &str) -> std::result::Result<Vec<RawProductRecord>, String> {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = rest.strip_prefix("json").unwrap_or(rest);
        body = body.strip_suffix("```").unwrap_or(body).trim();
    }
    if body.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(body).map_err(|e| format!("non-JSON reply: {}", e))?;
    parse_raw_batch(&value).map_err(|e| e.to_string())
}

/// Issues extraction requests against a [`CompletionService`]
pub struct Extractor<S> {
    service: S,
    model: String,
    timeout: Duration,
}

impl<S: CompletionService> Extractor<S> {
    /// Model and timeout come from the service's own configuration
    pub fn new(service: S) -> Self {
        let model = service.model().to_string();
        let timeout = service.timeout();
        Self {
            service,
            model,
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Build the request for `source` without sending it
    pub fn build_request(
        &self,
        mode: ExtractionMode,
        source: &str,
        context_hint: &str,
        filters: Option<&FilterConfig>,
    ) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            prompt: build_prompt(mode, source, context_hint, filters),
            response_schema: product_schema(),
            temperature: mode.temperature(),
        }
    }

    /// One service call, no retry; returns normalized records
    pub async fn extract(
        &self,
        mode: ExtractionMode,
        source: &str,
        context_hint: &str,
        filters: Option<&FilterConfig>,
    ) -> Result<Vec<ProductRecord>> {
        if source.trim().is_empty() {
            return Err(HarvestError::EmptyInput);
        }

        let request = self.build_request(mode, source, context_hint, filters);
        log::info!("Requesting {} extraction from {}", mode, self.model);

        let fail = |cause: String| {
            log::error!("{} extraction failed: {}", mode, cause);
            HarvestError::ExtractionService {
                mode,
                message: mode.failure_message().to_string(),
            }
        };

        let text = match tokio::time::timeout(self.timeout, self.service.generate(&request)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(fail(e.to_string())),
            Err(_) => return Err(fail(format!("no reply within {:?}", self.timeout))),
        };

        let raw = parse_reply(&text).map_err(fail)?;
        log::debug!("Service returned {} raw record(s)", raw.len());
        Ok(normalize(raw, &mode.provenance(source)))
    }

    /// Extract records from pasted text
    pub async fn extract_from_text(
        &self,
        text: &str,
        context_hint: &str,
        filters: Option<&FilterConfig>,
    ) -> Result<Vec<ProductRecord>> {
        self.extract(ExtractionMode::Text, text, context_hint, filters).await
    }

    /// Ask the model to fabricate records a crawl of `url` might have found
    pub async fn simulate_url_extraction(
        &self,
        url: &str,
        filters: Option<&FilterConfig>,
    ) -> Result<Vec<ProductRecord>> {
        let hint = match filters.map(|f| &f.category) {
            Some(CategoryFilter::Exact(category)) => category.as_str(),
            _ => "",
        };
        self.extract(ExtractionMode::UrlSimulation, url, hint, filters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ALL_CATEGORIES;
    use crate::service::{GeminiService, ServiceConfig, DEFAULT_MODEL};

    #[test]
    fn prompt_embeds_source_verbatim() {
        let source = "夏季爆款连衣裙 $15.99 销量10.2k 店铺: FashionNova";
        let prompt = build_prompt(ExtractionMode::Text, source, "", None);
        assert!(prompt.contains(source));
        assert!(prompt.contains("类目/上下文: 通用电商"));
        assert!(!prompt.contains("筛选条件"));
    }

    #[test]
    fn prompt_appends_constraints() {
        let filters = FilterConfig::from_text("女装服饰", "20", "50", "1000");
        let prompt = build_prompt(
            ExtractionMode::UrlSimulation,
            "https://tiktok.com/@shop",
            "女装服饰",
            Some(&filters),
        );
        assert!(prompt.contains("商品类目必须属于: 女装服饰"));
        assert!(prompt.contains("价格最低: $20"));
        assert!(prompt.contains("价格最高: $50"));
        assert!(prompt.contains("销量至少: 1000"));
        assert!(prompt.contains("3 到 6"));
    }

    #[test]
    fn unconstrained_filter_adds_no_clauses() {
        let filters = FilterConfig::from_text(ALL_CATEGORIES, "", "", "");
        assert!(constraint_clauses(&filters).is_empty());
        let prompt = build_prompt(ExtractionMode::Text, "x", "", Some(&filters));
        assert!(!prompt.contains("筛选条件"));
    }

    #[test]
    fn schema_requires_core_fields() {
        let schema = product_schema();
        assert_eq!(schema["type"], "ARRAY");
        let items = &schema["items"];
        assert_eq!(items["properties"].as_object().unwrap().len(), 8);
        for field in ["salesVolume", "productLink", "shopLink", "category"] {
            assert_eq!(items["properties"][field]["type"], "STRING");
        }
        assert_eq!(
            items["required"],
            json!(["productName", "price", "shopName", "rawContent"])
        );
    }

    #[test]
    fn modes_differ_in_temperature_and_message() {
        assert!(ExtractionMode::Text.temperature() < ExtractionMode::UrlSimulation.temperature());
        assert_ne!(
            ExtractionMode::Text.failure_message(),
            ExtractionMode::UrlSimulation.failure_message()
        );
        assert_eq!(
            ExtractionMode::UrlSimulation.provenance(" https://a.b "),
            "爬取自: https://a.b"
        );
    }

    #[test]
    fn reply_parsing() {
        assert!(parse_reply("").unwrap().is_empty());
        assert_eq!(parse_reply("```json\n[{\"price\":\"$1\"}]\n```").unwrap().len(), 1);
        assert!(parse_reply("not json").is_err());
        assert!(parse_reply("{\"productName\":\"x\"}").is_err());
    }

    #[test]
    fn extractor_takes_model_and_timeout_from_service_config() {
        let mut config = ServiceConfig::new("key");
        config.model = "gemini-custom".to_string();
        config.timeout = Duration::from_secs(5);
        let extractor = Extractor::new(GeminiService::new(config).unwrap());

        let request = extractor.build_request(ExtractionMode::Text, "x", "", None);
        assert_eq!(request.model, "gemini-custom");
        assert_eq!(extractor.timeout, Duration::from_secs(5));

        let fast = extractor.with_timeout(Duration::from_millis(20));
        assert_eq!(fast.timeout, Duration::from_millis(20));
        let request = fast.build_request(ExtractionMode::Text, "x", "", None);
        assert_eq!(request.model, "gemini-custom");
    }

    #[test]
    fn default_service_model_is_used_when_not_overridden() {
        let config = ServiceConfig::new("key");
        let extractor = Extractor::new(GeminiService::new(config).unwrap());
        let request = extractor.build_request(ExtractionMode::UrlSimulation, "x", "", None);
        assert_eq!(request.model, DEFAULT_MODEL);
    }
}
