use serde_json::json;

use crate::tests::fixtures::DealFixture;
use crate::workflows::conditions::presets;
use crate::workflows::{ConditionEvaluator, ConditionGroup, FieldCondition, JsonConditionEvaluator};

fn holds(group: &ConditionGroup, deal: &DealFixture) -> bool {
    JsonConditionEvaluator.evaluate(group, &deal.snapshot())
}

#[test]
fn test_stage_and_amount_presets() {
    let big_negotiation = ConditionGroup::and(vec![presets::stage("negotiation"), presets::amount_above(100_000.0)]);

    let deal = DealFixture::in_stage("negotiation").with_amount(250_000.0);
    assert!(holds(&big_negotiation, &deal));

    let small = DealFixture::in_stage("negotiation").with_amount(5_000.0);
    assert!(!holds(&big_negotiation, &small));

    let wrong_stage = DealFixture::in_stage("closed_won").with_amount(250_000.0);
    assert!(!holds(&big_negotiation, &wrong_stage));
}

#[test]
fn test_unassigned_preset_treats_null_owner_as_missing() {
    let group = ConditionGroup::and(vec![presets::unassigned()]);

    assert!(holds(&group, &DealFixture::default().unassigned()));
    assert!(!holds(&group, &DealFixture::default()));
}

#[test]
fn test_key_account_reads_nested_field() {
    let group = ConditionGroup::and(vec![presets::key_account()]);

    assert!(holds(&group, &DealFixture::default().key_account()));
    assert!(!holds(&group, &DealFixture::default()));
}

#[test]
fn test_email_domain_ignores_case() {
    let group = ConditionGroup::and(vec![presets::email_domain("@Acme.com")]);

    assert!(holds(&group, &DealFixture::default().with_email("buyer@acme.com")));
    assert!(!holds(&group, &DealFixture::default().with_email("buyer@acme.co.uk")));
}

#[test]
fn test_escalation_rule_with_nested_or() {
    // Key accounts, or any deal over 1M, once they reach negotiation
    let escalate = ConditionGroup::and(vec![presets::stage("negotiation")]).with_nested_group(ConditionGroup::or(vec![
        presets::key_account(),
        presets::amount_above(1_000_000.0),
    ]));

    assert!(holds(&escalate, &DealFixture::in_stage("negotiation").key_account()));
    assert!(holds(&escalate, &DealFixture::in_stage("negotiation").with_amount(2_000_000.0)));
    assert!(!holds(&escalate, &DealFixture::in_stage("negotiation").with_amount(10_000.0)));
    assert!(!holds(&escalate, &DealFixture::in_stage("qualification").key_account()));
}

#[test]
fn test_conditions_survive_serialization() {
    let group = ConditionGroup::or(vec![
        presets::stage("closed_won"),
        FieldCondition::in_list("stage", vec![json!("closed_lost"), json!("on_hold")]),
    ]);

    let stored = serde_json::to_value(&group).unwrap();
    let restored: ConditionGroup = serde_json::from_value(stored).unwrap();

    assert_eq!(restored, group);
    assert!(holds(&restored, &DealFixture::in_stage("on_hold")));
    assert!(!holds(&restored, &DealFixture::in_stage("prospecting")));
}
