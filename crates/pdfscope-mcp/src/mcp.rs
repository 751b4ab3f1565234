use crate::config::ServerConfig;
use crate::ops::{
    self, InfoArgs, OutlineArgs, ReadPagesArgs, ResolvePagesArgs, SearchArgs, ValidatePatternArgs,
};
use rmcp::{
    handler::server::router::tool::ToolRouter as RmcpToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServiceExt,
};
use std::sync::Arc;

fn tool_result(payload: serde_json::Value) -> CallToolResult {
    // Structured content for machine consumers, plus a text copy for clients that only read
    // `content[0].text`.
    let mut r = CallToolResult::structured(payload.clone());
    r.content = vec![Content::text(payload.to_string())];
    r
}

#[derive(Clone)]
pub(crate) struct PdfscopeMcp {
    tool_router: RmcpToolRouter<Self>,
    cfg: Arc<ServerConfig>,
}

#[tool_router]
impl PdfscopeMcp {
    pub(crate) fn new(cfg: ServerConfig) -> Self {
        Self {
            tool_router: Self::tool_router(),
            cfg: Arc::new(cfg),
        }
    }

    #[tool(description = "Report pdfscope version, text engine, limits and available local tools")]
    async fn pdfscope_meta(&self) -> Result<CallToolResult, McpError> {
        Ok(tool_result(ops::meta(&self.cfg)))
    }

    #[tool(description = "Page count, PDF version, metadata, outline presence and SHA-256 of a local PDF")]
    async fn pdf_info(
        &self,
        params: Parameters<Option<InfoArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        Ok(tool_result(ops::info(&self.cfg, args).await))
    }

    #[tool(
        description = "Resolve a page-range expression like \"1:5,8,10:\" into a sorted, de-duplicated page list"
    )]
    async fn pdf_resolve_pages(
        &self,
        params: Parameters<Option<ResolvePagesArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        Ok(tool_result(ops::resolve_pages(&self.cfg, args).await))
    }

    #[tool(description = "Extract text for selected pages only (bounded per page)")]
    async fn pdf_read_pages(
        &self,
        params: Parameters<Option<ReadPagesArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        Ok(tool_result(ops::read_pages(&self.cfg, args).await))
    }

    #[tool(
        description = "Search selected pages for a literal or /regex/flags pattern with context snippets; max_results/max_pages_scanned stop early"
    )]
    async fn pdf_search(
        &self,
        params: Parameters<Option<SearchArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        Ok(tool_result(ops::search(&self.cfg, args).await))
    }

    #[tool(description = "Bookmark tree (or flattened list) with resolved page numbers and a summary")]
    async fn pdf_outline(
        &self,
        params: Parameters<Option<OutlineArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        Ok(tool_result(ops::outline(&self.cfg, args).await))
    }

    #[tool(description = "Check a search pattern without scanning any document")]
    async fn pdf_validate_pattern(
        &self,
        params: Parameters<Option<ValidatePatternArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        Ok(tool_result(ops::validate_pattern(args)))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for PdfscopeMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Selective PDF queries over local files: resolve page ranges, read or search only the pages you need, and read bookmarks. Outputs are schema-versioned JSON."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

pub(crate) async fn serve_stdio(cfg: ServerConfig) -> Result<(), McpError> {
    let svc = PdfscopeMcp::new(cfg);
    let running = svc
        .serve(stdio())
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    // Keep serving until the client closes stdin.
    running
        .waiting()
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfscope_local::fixture::{Bookmark, FixtureDoc};

    fn p<T>(v: T) -> Parameters<Option<T>> {
        Parameters(Some(v))
    }

    fn payload_from_call_tool_result(r: &CallToolResult) -> serde_json::Value {
        let s = r
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default();
        serde_json::from_str(&s).expect("tool result should be a JSON string")
    }

    fn fixture_path(dir: &tempfile::TempDir) -> String {
        let bytes = FixtureDoc::new(&["alpha beta", "gamma alpha"])
            .bookmark(Bookmark::to_page("Start", 1))
            .to_bytes()
            .expect("fixture");
        let path = dir.path().join("t.pdf");
        std::fs::write(&path, bytes).expect("write");
        path.display().to_string()
    }

    #[tokio::test]
    async fn text_and_structured_content_agree() {
        let svc = PdfscopeMcp::new(ServerConfig::default());
        let r = svc.pdfscope_meta().await.expect("meta");
        let v = payload_from_call_tool_result(&r);
        assert_eq!(r.structured_content.as_ref(), Some(&v));
        assert_eq!(v["ok"], true);
        assert_eq!(v["kind"], "pdfscope_meta");
    }

    #[tokio::test]
    async fn missing_args_are_invalid_params_not_protocol_errors() {
        let svc = PdfscopeMcp::new(ServerConfig::default());
        let r = svc
            .pdf_search(Parameters(None))
            .await
            .expect("domain errors stay in the payload");
        let v = payload_from_call_tool_result(&r);
        assert_eq!(v["ok"], false);
        assert_eq!(v["error"]["code"], "invalid_params");
        assert!(v["error"]["message"].as_str().unwrap().contains("pattern"));
    }

    #[tokio::test]
    async fn search_tool_reports_all_matches_in_page_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture_path(&dir);
        let svc = PdfscopeMcp::new(ServerConfig::default());
        let r = svc
            .pdf_search(p(SearchArgs {
                path: Some(path),
                pattern: Some("/alpha/g".into()),
                context_chars: Some(10),
                ..Default::default()
            }))
            .await
            .unwrap();
        let v = payload_from_call_tool_result(&r);
        assert_eq!(v["ok"], true, "{v}");
        assert_eq!(v["strategy"], "exhaustive");
        assert_eq!(v["stopped_reason"], "completed");
        assert_eq!(v["total_matches"], 2);
        let pages: Vec<u64> = v["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["page"].as_u64().unwrap())
            .collect();
        assert_eq!(pages, [1, 2]);
    }

    #[tokio::test]
    async fn outline_tool_resolves_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture_path(&dir);
        let svc = PdfscopeMcp::new(ServerConfig::default());
        let r = svc
            .pdf_outline(p(OutlineArgs {
                path: Some(path),
                include_destinations: Some(true),
                ..Default::default()
            }))
            .await
            .unwrap();
        let v = payload_from_call_tool_result(&r);
        assert_eq!(v["items"][0]["title"], "Start");
        assert_eq!(v["items"][0]["page"], 1);
        assert_eq!(v["items"][0]["destination"]["kind"], "page_ref");
    }
}
