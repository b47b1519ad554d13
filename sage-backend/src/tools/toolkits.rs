//! Toolkit registry
//!
//! A toolkit groups interchangeable tools that provide the same capability.
//! The DAG executor uses it to substitute a failed tool with its siblings.
//! Toolkits are loaded from config/toolkits.ron at startup when the file
//! exists; otherwise the built-in grouping is used.

use crate::tools::types::ToolName;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

/// Global toolkit storage (loaded once at startup)
static TOOLKITS: OnceLock<ToolkitRegistry> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toolkit {
    pub name: String,
    /// Registry order; fallback tries members in this order
    pub tools: Vec<ToolName>,
}

/// Shape of config/toolkits.ron
#[derive(Debug, Deserialize)]
struct ToolkitFile {
    toolkits: Vec<ToolkitEntry>,
}

#[derive(Debug, Deserialize)]
struct ToolkitEntry {
    name: String,
    tools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolkitRegistry {
    toolkits: Vec<Toolkit>,
}

impl Default for ToolkitRegistry {
    fn default() -> Self {
        let kit = |name: &str, tools: &[ToolName]| Toolkit {
            name: name.to_string(),
            tools: tools.to_vec(),
        };
        ToolkitRegistry {
            toolkits: vec![
                kit(
                    "web_search",
                    &[ToolName::SerperWebSearch, ToolName::WorkerWebSearch],
                ),
                kit("news", &[ToolName::SerperNewsSearch]),
                kit("crypto", &[ToolName::Coingecko]),
                kit("weather", &[ToolName::Wheat]),
                kit("scrape", &[ToolName::WebScrape]),
                kit("encyclopedia", &[ToolName::WikipediaContent]),
            ],
        }
    }
}

impl ToolkitRegistry {
    pub fn new(toolkits: Vec<Toolkit>) -> Self {
        ToolkitRegistry { toolkits }
    }

    /// Parse the RON toolkit file. Unknown tool names are an error so a typo
    /// cannot silently disable a fallback.
    pub fn from_ron(content: &str) -> Result<Self, String> {
        let file: ToolkitFile =
            ron::from_str(content).map_err(|e| format!("invalid toolkit file: {}", e))?;

        let mut toolkits = Vec::with_capacity(file.toolkits.len());
        for entry in file.toolkits {
            if toolkits.iter().any(|t: &Toolkit| t.name == entry.name) {
                return Err(format!("toolkit '{}' is declared twice", entry.name));
            }
            let tools = entry
                .tools
                .iter()
                .map(|name| {
                    ToolName::from_str(name).map_err(|_| {
                        format!("toolkit '{}' references unknown tool '{}'", entry.name, name)
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            toolkits.push(Toolkit {
                name: entry.name,
                tools,
            });
        }
        Ok(ToolkitRegistry { toolkits })
    }

    pub fn toolkits(&self) -> &[Toolkit] {
        &self.toolkits
    }

    /// First toolkit (in registry order) containing the tool
    pub fn toolkit_of(&self, tool: ToolName) -> Option<&Toolkit> {
        self.toolkits.iter().find(|t| t.tools.contains(&tool))
    }

    /// The other members of the tool's toolkit, in registry order
    pub fn siblings(&self, tool: ToolName) -> Vec<ToolName> {
        self.toolkit_of(tool)
            .map(|kit| kit.tools.iter().copied().filter(|t| *t != tool).collect())
            .unwrap_or_default()
    }
}

/// Load toolkits from the config directory. A missing file selects the
/// built-in toolkits; an unreadable or invalid file is an error.
pub fn load_toolkits(config_dir: &Path) -> Result<&'static ToolkitRegistry, String> {
    let path = config_dir.join("toolkits.ron");

    let registry = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("[toolkits] Failed to read {:?}: {}", path, e))?;
        let registry = ToolkitRegistry::from_ron(&content)
            .map_err(|e| format!("[toolkits] Failed to parse {:?}: {}", path, e))?;
        log::info!(
            "[toolkits] Loaded {} toolkits from {:?}",
            registry.toolkits.len(),
            path
        );
        registry
    } else {
        log::info!("[toolkits] {:?} not found, using built-in toolkits", path);
        ToolkitRegistry::default()
    };

    Ok(TOOLKITS.get_or_init(|| registry))
}
