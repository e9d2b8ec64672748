use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use pk_domain::{Error, Result};

/// A compiled, read-only bundle keyed by prompt name (§3.4, §6.1). Pack
/// compilation itself (`packc`) is out of scope — this is the contract
/// the compiled JSON presents to the core, parsed once and then treated
/// as an immutable dictionary for the lifetime of every conversation that
/// opens against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pack {
    pub tools: HashMap<String, ToolSpec>,
    pub prompts: HashMap<String, PromptSpec>,
    #[serde(default)]
    pub skills: Vec<SkillSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSpec {
    pub system_template: String,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub validators: Vec<ValidatorDecl>,
    #[serde(default)]
    pub skills: Vec<String>,
}

/// One pack-declared validator: a type name the pack-to-hook factory
/// (`pk_hooks::build_guardrail`) dispatches on, plus its construction
/// parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorDecl {
    #[serde(rename = "type")]
    pub validator_type: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// A demand-loaded knowledge unit that may widen the active tool set when
/// activated. Resource loading itself is out of scope here — the pack
/// only carries the descriptor; a host resolves `resources` relative to
/// its own base directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

impl Pack {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let pack: Pack = serde_json::from_str(json)?;
        pack.validate()?;
        Ok(pack)
    }

    /// The pack's declared tools are the ceiling: no prompt or skill may
    /// name an `allowed_tools` entry the pack itself doesn't declare.
    pub fn validate(&self) -> Result<()> {
        for (prompt_name, prompt) in &self.prompts {
            for tool in &prompt.allowed_tools {
                if !self.tools.contains_key(tool) {
                    return Err(Error::InvalidPack(format!(
                        "prompt '{prompt_name}' allows tool '{tool}' not declared in pack.tools"
                    )));
                }
            }
            for skill_name in &prompt.skills {
                if !self.skills.iter().any(|s| &s.name == skill_name) {
                    return Err(Error::InvalidPack(format!(
                        "prompt '{prompt_name}' references undeclared skill '{skill_name}'"
                    )));
                }
            }
        }
        for skill in &self.skills {
            for tool in &skill.allowed_tools {
                if !self.tools.contains_key(tool) {
                    return Err(Error::InvalidPack(format!(
                        "skill '{}' allows tool '{tool}' not declared in pack.tools",
                        skill.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn prompt(&self, name: &str) -> Result<&PromptSpec> {
        self.prompts
            .get(name)
            .ok_or_else(|| Error::InvalidPack(format!("prompt '{name}' not found in pack")))
    }

    pub fn skill(&self, name: &str) -> Option<&SkillSpec> {
        self.skills.iter().find(|s| s.name == name)
    }
}
