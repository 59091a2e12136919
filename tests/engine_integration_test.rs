//! 引擎集成测试：三角色流水线端到端

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use hive::core::{EngineEvent, EnvironmentBuilder, RunOutcome};
    use hive::llm::{BackendRegistry, LlmClient, LlmError, ModelSettings};
    use hive::memory::{MemoryArchive, MemoryTier};
    use hive::policy::{BusinessRule, RulePredicate};
    use hive::role::bank;
    use hive::BusinessContext;

    struct SlowClient;

    #[async_trait]
    impl LlmClient for SlowClient {
        async fn complete(
            &self,
            _prompt: &str,
            _settings: &ModelSettings,
        ) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok("too late".to_string())
        }
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_full_pipeline_end_to_end() {
        let (mut env, mut rx) = EnvironmentBuilder::new()
            .with_business(bank::default_business())
            .with_actions(bank::default_actions())
            .with_roles(bank::default_roles())
            .build()
            .unwrap();

        env.publish_requirement("build a todo app").await;
        let outcome = env.run_to_completion().await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(env.rounds(), 3);
        assert_eq!(env.llm_calls(), 3);
        assert!(env.failures().is_empty());

        // 历史按因果链排列：requirement → plan → execution → review
        let history = env.history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].action_kind, "requirement");
        assert_eq!(history[1].action_kind, "plan");
        assert_eq!(history[2].action_kind, "execution");
        assert_eq!(history[3].action_kind, "review");
        for i in 1..4 {
            assert_eq!(
                history[i].caused_by.as_deref(),
                Some(history[i - 1].id.as_str())
            );
        }

        // 每个角色恰好一条记忆
        let store = env.store();
        assert_eq!(store.partition_len("Planner").await, 1);
        assert_eq!(store.partition_len("Executor").await, 1);
        assert_eq!(store.partition_len("Reviewer").await, 1);

        let events = drain(&mut rx);
        let rounds = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::RoundStarted { .. }))
            .count();
        assert_eq!(rounds, 3);
        assert!(events.iter().any(
            |e| matches!(e, EngineEvent::RunFinished { outcome, .. } if outcome == "completed")
        ));
    }

    #[tokio::test]
    async fn test_gate_rejection_leaves_no_trace() {
        let business = BusinessContext::new().with_rule(BusinessRule::new(
            "r-ban",
            "must not mention forbidden words",
            RulePredicate::NotContains("forbidden".into()),
        ));
        let (mut env, _rx) = EnvironmentBuilder::new()
            .with_business(business)
            .with_actions(bank::default_actions())
            .with_roles(bank::default_roles())
            .build()
            .unwrap();

        // mock 回显需求文本，计划必然踩中违禁词
        env.publish_requirement("ship the forbidden feature").await;
        let outcome = env.run_to_completion().await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(env.failures().len(), 1);
        assert_eq!(env.failures()[0].role_id, "Planner");
        assert!(env.failures()[0].error.contains("Policy violation"));

        // 被拒产出既不进历史也不进记忆，下游角色从未被触发
        assert_eq!(env.history().len(), 1);
        let store = env.store();
        assert_eq!(store.partition_len("Planner").await, 0);
        assert_eq!(store.partition_len("Executor").await, 0);
    }

    #[tokio::test]
    async fn test_memory_promote_and_evict_after_run() {
        let (mut env, _rx) = EnvironmentBuilder::new()
            .with_actions(bank::default_actions())
            .with_roles(
                bank::default_roles()
                    .into_iter()
                    .map(|d| d.with_objective("todo-app")),
            )
            .with_archive(MemoryArchive::in_memory())
            .build()
            .unwrap();

        env.publish_requirement("build a todo app").await;
        assert_eq!(env.run_to_completion().await, RunOutcome::Completed);

        let store = env.store();
        let by_objective = store.query_by_objective("todo-app").await;
        assert_eq!(by_objective.len(), 3);

        // 提升一条为长期记忆，随后的淘汰应只带走短期条目
        let plan_entry = by_objective[0].id;
        let long_term_id = store.promote(plan_entry).await.unwrap();
        assert_ne!(long_term_id, plan_entry);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let evicted = store
            .evict_expired(Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(evicted, 3);

        let survivor = store.get(long_term_id).await.unwrap();
        assert_eq!(survivor.tier, MemoryTier::LongTerm);
        assert_eq!(survivor.objective_id.as_deref(), Some("todo-app"));
        assert_eq!(store.query_by_objective("todo-app").await.len(), 1);

        // 被淘汰的条目能在归档里找回
        let archive = store.archive().unwrap();
        assert_eq!(archive.len(), 3);
        assert!(archive.get(plan_entry).is_some());
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_slow_action() {
        let mut backends = BackendRegistry::new("slow");
        backends.register("slow", Arc::new(SlowClient));
        let (mut env, _rx) = EnvironmentBuilder::new()
            .with_backends(backends)
            .with_actions(bank::default_actions())
            .with_roles(bank::default_roles())
            .build()
            .unwrap();

        env.publish_requirement("build a todo app").await;
        let cancel = env.supervisor().cancel_token();

        let run = tokio::spawn(async move {
            let outcome = env.run_to_completion().await;
            (outcome, env)
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let (outcome, env) = run.await.unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
        // 慢动作被打断，计划从未发布
        assert_eq!(env.history().len(), 1);
    }

    #[tokio::test]
    async fn test_events_serialize_as_tagged_json() {
        let (mut env, mut rx) = EnvironmentBuilder::new()
            .with_actions(bank::default_actions())
            .with_roles(bank::default_roles())
            .build()
            .unwrap();
        env.publish_requirement("build a todo app").await;
        env.run_to_completion().await;

        let events = drain(&mut rx);
        let published = events
            .iter()
            .find(|e| matches!(e, EngineEvent::MessagePublished { .. }))
            .unwrap();
        let json = serde_json::to_string(published).unwrap();
        assert!(json.contains("\"type\":\"message_published\""));
    }
}
