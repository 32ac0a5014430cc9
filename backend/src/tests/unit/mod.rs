mod condition_presets;
mod engine_flows;
mod workflow_lifecycle;
