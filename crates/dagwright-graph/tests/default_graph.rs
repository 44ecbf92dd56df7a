use std::sync::Arc;

use dagwright_core::types::{ContextMap, NodeKind, Prompt};
use dagwright_graph::{Edge, GraphComponents, GraphManager, GraphProposal, PromptLibrary};
use dagwright_test_utils::{MockCapability, MockDataSource};

fn components() -> GraphComponents {
    let prompts = PromptLibrary::from_prompts([
        Prompt::new("main_agent_prompt", "You are an on-chain assistant. "),
        Prompt::new("general_agent_prompt", "Answer briefly."),
    ]);
    GraphComponents::new("default_dag", Arc::new(prompts))
        .with_skill(MockCapability::new("proposals").keywords(&["proposal"]).shared())
        .with_skill(MockCapability::new("pr_review").keywords(&["github", "review"]).shared())
        .with_service(MockCapability::new("pinning").keywords(&["ipfs"]).shared())
}

#[tokio::test]
async fn routes_to_skill_through_prompt_and_router() {
    let mut manager = GraphManager::new();
    let graph = manager.create_default_graph(&components()).unwrap();

    assert_eq!(graph.entry().unwrap().as_deref(), Some("main_prompt"));
    assert_eq!(graph.edges().unwrap(), vec![Edge::new("main_prompt", "main_router")]);

    let state = manager
        .execute("Please review this GitHub PR", ContextMap::new())
        .await
        .unwrap();

    assert_eq!(state.results["main_router"], "Routed to: pr_review_skill");
    assert_eq!(
        state.results["pr_review_skill"],
        "pr_review handled: Please review this GitHub PR"
    );
    assert!(!state.results.contains_key("proposals_skill"));
    assert_eq!(state.metadata["dag_name"], "default_dag");
    assert_eq!(
        state.context_str("active_prompt"),
        Some("You are an on-chain assistant. Answer briefly.")
    );
}

#[tokio::test]
async fn routes_to_service_nodes() {
    let mut manager = GraphManager::new();
    manager.create_default_graph(&components()).unwrap();
    let state = manager
        .execute("pin this to ipfs", ContextMap::new())
        .await
        .unwrap();
    assert_eq!(state.results["main_router"], "Routed to: pinning_service");
    assert!(state.results.contains_key("pinning_service"));
}

#[tokio::test]
async fn unmatched_query_stops_at_router() {
    let mut manager = GraphManager::new();
    manager.create_default_graph(&components()).unwrap();
    let state = manager.execute("good morning", ContextMap::new()).await.unwrap();
    assert_eq!(state.results["main_router"], "Routed to: default");
    assert_eq!(state.results.len(), 2);
}

#[tokio::test]
async fn data_source_sits_between_prompt_and_router() {
    let mut manager = GraphManager::new();
    let comps = components().with_data_source(Arc::new(MockDataSource::new(&["doc1", "doc2"])), 5);
    let graph = manager.create_default_graph(&comps).unwrap();

    assert_eq!(
        graph.edges().unwrap(),
        vec![
            Edge::new("main_prompt", "dataset_source"),
            Edge::new("dataset_source", "main_router"),
        ]
    );
    let state = manager.execute("proposal 7", ContextMap::new()).await.unwrap();
    assert_eq!(state.context["relevant_documents"].as_array().unwrap().len(), 2);
    assert!(state.results.contains_key("proposals_skill"));
}

#[tokio::test]
async fn extra_routing_rules_only_branch_to_existing_nodes() {
    let mut manager = GraphManager::new();
    let comps = components()
        .with_routing_rule("sentiment", "twitter_sentiment_skill")
        .with_routing_rule("vote", "proposals_skill");
    let graph = manager.create_default_graph(&comps).unwrap();

    let cond = graph.conditional_edges().unwrap();
    let branches = &cond["main_router"].branches;
    assert!(branches.contains_key("proposals_skill"));
    assert!(!branches.contains_key("twitter_sentiment_skill"));

    let state = manager.execute("how do I vote", ContextMap::new()).await.unwrap();
    assert!(state.results.contains_key("proposals_skill"));
}

#[tokio::test]
async fn proposal_applies_and_rolls_back() {
    let mut manager = GraphManager::new();
    manager.create_default_graph(&components()).unwrap();

    let mut proposal = GraphProposal::new("p-1", "Retire pinning");
    proposal.remove_nodes.push("pinning_service".into());
    manager.apply_proposal(&proposal).unwrap();

    let graph = manager.current().unwrap();
    assert!(!graph.contains("pinning_service").unwrap());
    assert_eq!(manager.history_len(), 1);

    let state = manager.execute("pin to ipfs", ContextMap::new()).await.unwrap();
    assert_eq!(state.results["main_router"], "Routed to: pinning_service");
    assert!(!state.results.contains_key("pinning_service"));

    assert!(manager.rollback_to_previous());
    assert!(manager.current().unwrap().contains("pinning_service").unwrap());
    assert!(!manager.rollback_to_previous());
}

#[test]
fn proposal_with_dangling_edge_is_rejected_untouched() {
    let mut manager = GraphManager::new();
    manager.create_default_graph(&components()).unwrap();
    let before = manager.serialize().unwrap();

    let mut proposal = GraphProposal::new("p-2", "Bad edge");
    proposal.add_edges.push(Edge::new("main_router", "ghost"));
    assert!(manager.apply_proposal(&proposal).is_err());

    assert_eq!(manager.serialize().unwrap(), before);
    assert_eq!(manager.history_len(), 0);
}

#[test]
fn visualization_lists_topology() {
    let mut manager = GraphManager::new();
    manager.create_default_graph(&components()).unwrap();
    let text = manager.visualize().unwrap();
    assert!(text.contains("  - main_router (router): Main Router"));
    assert!(text.contains("  - pr_review_skill (skill): Pr_review Skill"));
    assert!(text.contains("  - main_prompt -> main_router"));
    assert!(text.contains("    - pinning_service -> pinning_service"));
}

#[tokio::test]
async fn tools_are_routed_like_services() {
    let mut manager = GraphManager::new();
    let comps =
        components().with_tool(MockCapability::new("calculator").keywords(&["compute"]).shared());
    let graph = manager.create_default_graph(&comps).unwrap();
    assert!(graph.contains("calculator_tool").unwrap());

    let state = manager.execute("compute the APY", ContextMap::new()).await.unwrap();
    assert_eq!(state.results["main_router"], "Routed to: calculator_tool");
    assert_eq!(state.results["calculator_tool"], "calculator handled: compute the APY");
}

#[tokio::test]
async fn added_capability_is_routed_immediately() {
    let mut manager = GraphManager::new();
    manager.create_default_graph(&components()).unwrap();

    let node_id = manager
        .add_capability(
            MockCapability::new("staking").keywords(&["stake"]).shared(),
            NodeKind::Skill,
        )
        .unwrap();
    assert_eq!(node_id, "staking_skill");
    assert_eq!(manager.history_len(), 1);

    let graph = manager.current().unwrap();
    let branches = graph.conditional_edges().unwrap()["main_router"].branches.clone();
    assert!(branches.contains_key("staking_skill"));
    assert!(branches.contains_key("proposals_skill"));

    let state = manager.execute("stake 32 ETH", ContextMap::new()).await.unwrap();
    assert_eq!(state.results["main_router"], "Routed to: staking_skill");
    assert!(state.results.contains_key("staking_skill"));

    let state = manager.execute("staking rewards", ContextMap::new()).await.unwrap();
    assert!(state.results.contains_key("staking_skill"));

    assert!(manager
        .add_capability(MockCapability::new("staking").shared(), NodeKind::Skill)
        .is_err());
}

#[tokio::test]
async fn removed_capability_takes_its_rules_along() {
    let mut manager = GraphManager::new();
    manager.create_default_graph(&components()).unwrap();

    assert!(manager.remove_capability("pr_review", NodeKind::Skill).unwrap());
    assert!(!manager.remove_capability("pr_review", NodeKind::Skill).unwrap());

    let graph = manager.current().unwrap();
    assert!(!graph.contains("pr_review_skill").unwrap());
    let branches = graph.conditional_edges().unwrap()["main_router"].branches.clone();
    assert!(!branches.contains_key("pr_review_skill"));

    let state = manager.execute("review this github PR", ContextMap::new()).await.unwrap();
    assert_eq!(state.results["main_router"], "Routed to: default");

    let state = manager.execute("new proposal", ContextMap::new()).await.unwrap();
    assert!(state.results.contains_key("proposals_skill"));

    assert!(manager.rollback_to_previous());
    assert!(manager.current().unwrap().contains("pr_review_skill").unwrap());
}

#[test]
fn removing_last_capability_drops_router_branches() {
    let mut manager = GraphManager::new();
    let comps = GraphComponents::new("solo", Arc::new(PromptLibrary::new()))
        .with_skill(MockCapability::new("proposals").keywords(&["proposal"]).shared());
    manager.create_default_graph(&comps).unwrap();

    assert!(manager.remove_capability("proposals", NodeKind::Skill).unwrap());
    let graph = manager.current().unwrap();
    assert!(graph.conditional_edges().unwrap().is_empty());
}
