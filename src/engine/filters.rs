use chrono::{DateTime, Utc};

use crate::limits::*;
use crate::model::{Event, Stay};
use crate::rules::{applicable_rules_by_night, FilterDraft, NightlyRules, Rule, RuleId};

use super::{Engine, EngineError};

fn check_rule_limits(rule: &Rule) -> Result<(), EngineError> {
    if rule.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("filter name too long"));
    }
    if rule.description.as_ref().is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN) {
        return Err(EngineError::LimitExceeded("filter description too long"));
    }
    Ok(())
}

impl Engine {
    pub async fn create_filter(&self, draft: FilterDraft) -> Result<Rule, EngineError> {
        let _permit = self.write_permit().await;
        let mut book = self.rules.write().await;
        if book.rules.len() >= MAX_RULES {
            return Err(EngineError::LimitExceeded("too many filters"));
        }
        let rule = draft.into_rule(book.peek_id())?;
        check_rule_limits(&rule)?;

        let event = Event::FilterSaved { rule: rule.clone() };
        self.persist_rule_event(&mut book, &event).await?;
        tracing::info!(filter_id = rule.id, name = %rule.name, "filter created");
        Ok(rule)
    }

    /// Replaces every field of an existing filter.
    pub async fn update_filter(&self, id: RuleId, draft: FilterDraft) -> Result<Rule, EngineError> {
        let _permit = self.write_permit().await;
        let mut book = self.rules.write().await;
        if !book.rules.contains_key(&id) {
            return Err(EngineError::not_found("filter", id));
        }
        let rule = draft.into_rule(id)?;
        check_rule_limits(&rule)?;

        let event = Event::FilterSaved { rule: rule.clone() };
        self.persist_rule_event(&mut book, &event).await?;
        tracing::info!(filter_id = id, "filter updated");
        Ok(rule)
    }

    pub async fn delete_filter(&self, id: RuleId) -> Result<(), EngineError> {
        let _permit = self.write_permit().await;
        let mut book = self.rules.write().await;
        if !book.rules.contains_key(&id) {
            return Err(EngineError::not_found("filter", id));
        }
        self.persist_rule_event(&mut book, &Event::FilterDeleted { id }).await?;
        tracing::info!(filter_id = id, "filter deleted");
        Ok(())
    }

    pub async fn get_filter(&self, id: RuleId) -> Result<Rule, EngineError> {
        self.rules
            .read()
            .await
            .rules
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("filter", id))
    }

    /// All filters, ascending by id.
    pub async fn list_filters(&self) -> Vec<Rule> {
        self.rules.read().await.rules.values().cloned().collect()
    }

    pub async fn applicable_filters(&self, stay: &Stay, now: DateTime<Utc>) -> NightlyRules {
        let book = self.rules.read().await;
        applicable_rules_by_night(stay, book.rules.values(), now)
    }
}
