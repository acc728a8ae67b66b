//! Think/act/observe chat agent. Malformed steps are fed back as observations.

use crate::tools::ToolRegistry;
use crate::traits::TextGenerator;
use crate::watsonx::{Generation, GenerationParameters};
use crate::AgentError;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

pub const ITERATION_LIMIT_ANSWER: &str = "Agent stopped due to iteration limit.";

const FINAL_ANSWER: &str = "Final Answer:";
const OBSERVATION: &str = "Observation:";
const MAX_OBSERVATION_CHARS: usize = 4_000;

const PREAMBLE: &str = "You are a helpful assistant for renters and home seekers. \
Answer the following question as best you can, citing the documents you used. \
You have access to the following tools:";

const FORMAT_INSTRUCTIONS: &str = "Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStep {
    Action { tool: String, input: String },
    Finish { answer: String },
}

fn action_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)Action\s*\d*\s*:\s*(.*?)\s*Action\s*\d*\s*Input\s*\d*\s*:\s*(.*)")
            .expect("action pattern is valid")
    })
}

/// Reads one model step. The error string is the observation shown back to
/// the model.
pub fn parse_step(output: &str) -> Result<AgentStep, String> {
    let output = output.split(OBSERVATION).next().unwrap_or_default();
    let action = action_pattern().captures(output);
    let final_at = output.find(FINAL_ANSWER);

    if let Some(position) = final_at {
        let action_first = action
            .as_ref()
            .and_then(|captures| captures.get(0))
            .is_some_and(|found| found.start() < position);
        if !action_first {
            let answer = output[position + FINAL_ANSWER.len()..].trim().to_string();
            return Ok(AgentStep::Finish { answer });
        }
    }

    if let Some(captures) = action {
        let tool = captures.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let input = captures
            .get(2)
            .map(|m| m.as_str().split(FINAL_ANSWER).next().unwrap_or_default())
            .unwrap_or_default()
            .trim()
            .trim_matches('"')
            .trim();

        if tool.is_empty() {
            return Err("Invalid Format: Missing tool name after 'Action:'".to_string());
        }

        return Ok(AgentStep::Action {
            tool: tool.to_string(),
            input: input.to_string(),
        });
    }

    if output.contains("Action:") {
        Err("Invalid Format: Missing 'Action Input:' after 'Action:'".to_string())
    } else {
        Err("Invalid Format: Missing 'Action:' after 'Thought:'".to_string())
    }
}

pub struct ChatAgent {
    generator: Arc<dyn TextGenerator>,
    tools: ToolRegistry,
    max_iterations: usize,
    parameters: GenerationParameters,
}

impl ChatAgent {
    pub fn new(generator: Arc<dyn TextGenerator>, tools: ToolRegistry, max_iterations: usize) -> Self {
        Self {
            generator,
            tools,
            max_iterations: max_iterations.max(1),
            parameters: GenerationParameters {
                stop_sequences: Some(vec![format!("\n{OBSERVATION}"), OBSERVATION.to_string()]),
                ..GenerationParameters::default()
            },
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn build_prompt(&self, question: &str, scratchpad: &str) -> String {
        let descriptions = self
            .tools
            .tools()
            .map(|tool| format!("{}: {}", tool.name(), tool.description()))
            .collect::<Vec<_>>()
            .join("\n");
        let format = FORMAT_INSTRUCTIONS.replace("{tool_names}", &self.tools.names().join(", "));

        format!("{PREAMBLE}\n\n{descriptions}\n\n{format}\n\nBegin!\n\nQuestion: {question}\nThought:{scratchpad}")
    }

    pub async fn run(&self, question: &str) -> Result<String, AgentError> {
        let mut scratchpad = String::new();

        for iteration in 1..=self.max_iterations {
            let prompt = self.build_prompt(question, &scratchpad);
            let output = match self.generator.generate(&prompt, &self.parameters).await? {
                Generation::Text(text) => text,
                Generation::Rejected(payload) => return Err(AgentError::Rejected(payload.to_string())),
                Generation::Misconfigured(message) => return Err(AgentError::Misconfigured(message)),
            };
            debug!(iteration, output = %output, "agent step");

            let observation = match parse_step(&output) {
                Ok(AgentStep::Finish { answer }) => {
                    info!(iterations = iteration, "agent finished");
                    return Ok(answer);
                }
                Ok(AgentStep::Action { tool, input }) => self.call_tool(&tool, &input).await,
                Err(format_error) => {
                    warn!(iteration, error = %format_error, "unparseable agent step");
                    format_error
                }
            };

            let log = output.split(OBSERVATION).next().unwrap_or_default().trim_end();
            scratchpad.push_str(&format!(" {log}\n{OBSERVATION} {observation}\nThought:"));
        }

        warn!(max_iterations = self.max_iterations, "agent hit iteration limit");
        Ok(ITERATION_LIMIT_ANSWER.to_string())
    }

    async fn call_tool(&self, name: &str, input: &str) -> String {
        let Some(tool) = self.tools.get(name) else {
            return format!(
                "{name} is not a valid tool, try one of [{}].",
                self.tools.names().join(", ")
            );
        };

        let observation = tool.call(input).await;
        truncate_chars(observation, MAX_OBSERVATION_CHARS)
    }
}

fn truncate_chars(text: String, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}
