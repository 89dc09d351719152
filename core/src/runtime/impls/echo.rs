//! Offline inference
//!
//! A deterministic stand-in for a model so the CLI runs without a provider.
//! It answers in the structured format, echoes every trusted fact, and
//! turns `search ...` requests into a SEARCH intent.

use serde_json::{json, Map, Value};

use crate::error::InferenceError;
use crate::guard::FactValue;
use crate::runtime::capability::{Capability, InferenceCapability, InferenceRequest};
use crate::runtime::context::RuntimeContext;

#[derive(Debug, Clone, Copy, Default)]
pub struct EchoInference;

impl EchoInference {
    fn reply(req: &InferenceRequest) -> Value {
        let mut facts = Map::new();
        for fact in req.facts.iter() {
            let value = match &fact.value {
                FactValue::Number(n) => json!(n),
                FactValue::Text(s) => json!(s),
            };
            facts.insert(fact.name.clone(), value);
        }

        let recalled = req
            .memories
            .first()
            .map(|hit| format!(" It reminds me of: {}.", hit.content))
            .unwrap_or_default();

        let mut reply = match req.input.as_deref().map(str::trim) {
            Some(input) => json!({
                "internal_thought": format!("They said \"{}\". I'll answer plainly.", input),
                "speech_content": format!("You said: {}.{}", input, recalled),
            }),
            None => json!({
                "internal_thought": "It has been quiet for a while.",
                "speech_content": format!("It's quiet. I'm still here.{}", recalled),
            }),
        };
        reply["fact_echo"] = Value::Object(facts);

        if let Some(query) = req
            .input
            .as_deref()
            .and_then(|input| input.trim().strip_prefix("search "))
        {
            reply["tool_intent"] = json!({
                "tool": "SEARCH",
                "query": query.trim(),
                "reason": "asked to look it up",
            });
        }
        reply
    }
}

impl Capability for EchoInference {
    fn name(&self) -> &'static str {
        "echo-inference"
    }
}

#[async_trait::async_trait]
impl InferenceCapability for EchoInference {
    async fn infer(&self, ctx: &RuntimeContext, req: InferenceRequest) -> Result<String, InferenceError> {
        if ctx.is_cancelled() {
            return Err(InferenceError::unavailable("cancelled"));
        }
        Ok(Self::reply(&req).to_string())
    }
}
