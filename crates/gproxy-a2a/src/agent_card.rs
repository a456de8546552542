//! `/.well-known/agent.json` (§6 external interfaces) + `agent/authenticatedExtendedCard`.

use crate::model::{AgentCapabilities, AgentCard, AgentSkill};

#[derive(Debug, Clone)]
pub struct AgentCardConfig {
    pub name: String,
    pub description: String,
    pub url: String,
    pub version: String,
    pub skills: Vec<AgentSkill>,
}

pub fn build_agent_card(config: &AgentCardConfig) -> AgentCard {
    AgentCard {
        name: config.name.clone(),
        description: config.description.clone(),
        url: config.url.clone(),
        version: config.version.clone(),
        capabilities: AgentCapabilities {
            streaming: true,
            push_notifications: true,
            state_transition_history: true,
        },
        skills: config.skills.clone(),
        default_input_modes: vec!["text".to_string()],
        default_output_modes: vec!["text".to_string()],
    }
}
