use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::search::{IndexCache, SearchFilters};

// Tool request types
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchCatalogRequest {
    #[schemars(description = "Free-text query matched against names, brands and material types")]
    pub query: String,
    #[schemars(description = "Comma-separated result types: brand, material, package, container")]
    pub types: Option<String>,
    #[schemars(description = "Only results belonging to this brand slug")]
    pub brand: Option<String>,
    #[schemars(description = "Only materials of this type, e.g. PLA")]
    pub material_type: Option<String>,
    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<usize>,
}

impl SearchCatalogRequest {
    fn filters(&self) -> SearchFilters {
        SearchFilters::from_raw(
            self.types.as_deref(),
            self.brand.as_deref(),
            self.material_type.as_deref(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct CatalogServer {
    pub cache: IndexCache,
    pub config: Arc<Config>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CatalogServer {
    pub fn new(cache: IndexCache, config: Arc<Config>) -> Self {
        Self {
            cache,
            config,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Search brands, materials, packages and containers in the catalog")]
    async fn search_catalog(
        &self,
        Parameters(req): Parameters<SearchCatalogRequest>,
    ) -> Result<CallToolResult, McpError> {
        let filters = req.filters();
        let limit = self.config.clamp_limit(req.limit);

        match self.cache.search(&req.query, &filters, limit).await {
            Ok(results) => {
                let response = json!({
                    "results": results,
                    "query": req.query,
                    "filters": filters,
                    "totalCount": results.len(),
                });
                let content = serde_json::to_string_pretty(&response)
                    .unwrap_or_else(|e| format!("Error serializing results: {e}"));
                Ok(CallToolResult::success(vec![Content::text(content)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(format!(
                "Error searching catalog: {e:#}"
            ))])),
        }
    }

    #[tool(description = "Get the state of the in-memory search index")]
    fn get_index_status(&self) -> Result<CallToolResult, McpError> {
        let content = serde_json::to_string_pretty(&self.cache.status())
            .unwrap_or_else(|e| format!("Error serializing status: {e}"));
        Ok(CallToolResult::success(vec![Content::text(content)]))
    }

    #[tool(description = "Drop the search index and rebuild it from the catalog files")]
    fn refresh_index(&self) -> Result<CallToolResult, McpError> {
        info!("Search index refresh requested over MCP");
        self.cache.invalidate();

        let response = json!({
            "status": "rebuilding",
            "index": self.cache.status(),
        });
        let content = serde_json::to_string_pretty(&response)
            .unwrap_or_else(|e| format!("Error serializing status: {e}"));
        Ok(CallToolResult::success(vec![Content::text(content)]))
    }
}

#[tool_handler]
impl ServerHandler for CatalogServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some("Catalog search MCP server. Use search_catalog to find brands, materials, packages and containers by name; get_index_status and refresh_index inspect and rebuild the index.".to_string()),
            ..Default::default()
        }
    }
}
