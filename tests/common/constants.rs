//! Shared constants for end-to-end tests
//!
//! When fake tool behavior or timing changes, update only this file.

// ============================================================================
// Timing
// ============================================================================

/// Per-request timeout of the test HTTP client
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// How long to wait for a spawned server to answer `GET /`
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between readiness polls
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Timeout configured for the slow fake echidna
pub const SLOW_TOOL_TIMEOUT_SECS: u64 = 1;

/// How long the slow fake echidna would run if nobody killed it
pub const SLOW_TOOL_SLEEP_SECS: u64 = 30;

// ============================================================================
// Tools
// ============================================================================

pub const MYTHRIL: &str = "mythril-analyze";
pub const SLITHER: &str = "slither-analyze";
pub const ECHIDNA: &str = "echidna-analyze";
pub const MAIAN: &str = "maian-analyze";
pub const MANTICORE: &str = "manticore-analyze";

/// Built-in tools in registration order
pub const ALL_TOOLS: [&str; 5] = [MYTHRIL, SLITHER, ECHIDNA, MAIAN, MANTICORE];

/// Findings reported by the fake slither
pub const SLITHER_FINDINGS: usize = 2;

/// Findings reported by the fake mythril
pub const MYTHRIL_FINDINGS: usize = 1;

// ============================================================================
// Contracts
// ============================================================================

pub const SAMPLE_CONTRACT: &str = r#"pragma solidity ^0.8.0;

contract Vault {
    mapping(address => uint256) public balances;

    function deposit() external payable {
        balances[msg.sender] += msg.value;
    }

    function withdraw() external {
        uint256 amount = balances[msg.sender];
        (bool ok, ) = msg.sender.call{value: amount}("");
        require(ok);
        balances[msg.sender] = 0;
    }
}
"#;
