//! MCP Prompts

use std::collections::HashMap;

use super::protocol::{PromptMessage, PromptsGetResult, ToolResultContent};
use super::registry::{McpRegistry, PromptBuilder, PromptResult, RegisteredPrompt};

const DEFAULT_CONTRACT_TYPE: &str = "generic";
const DEFAULT_FOCUS_AREA: &str = "all vulnerabilities";

/// Register all prompts with the registry
pub fn register_all_prompts(registry: &mut McpRegistry) {
    registry.register_prompt(analyze_contract_prompt());
}

fn analyze_contract_prompt() -> RegisteredPrompt {
    PromptBuilder::new("analyze-contract")
        .description("Get analysis recommendations for a smart contract")
        .argument(
            "contract_type",
            "Type of contract (ERC20, ERC721, DeFi, etc.)",
            false,
        )
        .argument(
            "focus_area",
            "Specific vulnerability focus (reentrancy, overflow, access control, etc.)",
            false,
        )
        .build(analyze_contract)
}

fn analyze_contract(arguments: HashMap<String, String>) -> PromptResult {
    let contract_type = arguments
        .get("contract_type")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONTRACT_TYPE);
    let focus_area = arguments
        .get("focus_area")
        .map(String::as_str)
        .unwrap_or(DEFAULT_FOCUS_AREA);

    let text = format!(
        "Please analyze this {contract_type} smart contract focusing on {focus_area}. \
         Use the mythril-analyze, slither-analyze, and echidna-analyze tools to perform a \
         comprehensive vulnerability analysis. Look for common issues like reentrancy attacks, \
         integer overflow/underflow, access control vulnerabilities and other security concerns \
         specific to {contract_type} contracts. Use echidna-analyze for property-based testing \
         to find edge cases and check contract invariants."
    );

    Ok(PromptsGetResult {
        description: Some("Analyze smart contract for vulnerabilities".to_string()),
        messages: vec![PromptMessage {
            role: "user".to_string(),
            content: ToolResultContent::Text { text },
        }],
    })
}
