//! Bundled demo dialogues.

use std::sync::Arc;

use clap::ValueEnum;
use tracing::warn;

use promptflow_core::{
    EngineConfig, Guard, IncomingMessage, MenuPager, NodeId, Prompt, PromptGraph, Record,
    StepError, Visual,
};

const NOT_A_NUMBER: &str = "That's not a valid number, try again.";
const TOO_FEW_FRIENDS: &str = "You have to have more than one friend! Try again.";

const COLORS: &[(&str, &str)] = &[
    ("Red", "Warm and loud"),
    ("Orange", "Citrus"),
    ("Yellow", "Sunshine"),
    ("Green", "Leaves"),
    ("Blue", "Sea and sky"),
    ("Indigo", "Deep night"),
    ("Violet", "Flowers"),
    ("Black", ""),
];

/// Which dialogue to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// Name, then age, then a summary.
    Person,
    /// Number of friends, then each friend's name.
    Friends,
    /// Paged multi-select menu of colors.
    Menu,
}

/// A demo graph and where it starts.
#[derive(Debug)]
pub struct DemoGraph {
    pub graph: PromptGraph<Record>,
    pub root: NodeId,
}

impl Demo {
    pub fn build(self, config: &EngineConfig) -> anyhow::Result<DemoGraph> {
        match self {
            Demo::Person => person(config),
            Demo::Friends => friends(config),
            Demo::Menu => menu(config),
        }
    }
}

fn parse_number(message: &IncomingMessage) -> Result<i64, StepError> {
    message
        .content
        .trim()
        .parse()
        .map_err(|_| StepError::reject(NOT_A_NUMBER))
}

fn person(config: &EngineConfig) -> anyhow::Result<DemoGraph> {
    let mut graph = PromptGraph::new();
    let name = graph.add_node(
        Prompt::fixed(Visual::message("What is your name?"))
            .config(config)
            .sync_transform(|m, data: Record| Ok(data.with("name", m.content.trim())))
            .build(),
    );
    let age = graph.add_node(
        Prompt::fixed(Visual::message("How old are you?"))
            .config(config)
            .sync_transform(|m, data: Record| Ok(data.with("age", parse_number(&m)?)))
            .build(),
    );
    let summary = graph.add_node(
        Prompt::generated(|data: &Record| {
            Visual::message(format!(
                "Nice to meet you, {}! You are {} years old.",
                data.get_str("name").unwrap_or("stranger"),
                data.get_i64("age").unwrap_or_default()
            ))
        })
        .build(),
    );
    graph.add_child(name, age)?.add_child(age, summary)?;
    Ok(DemoGraph { graph, root: name })
}

fn friends(config: &EngineConfig) -> anyhow::Result<DemoGraph> {
    let mut graph = PromptGraph::new();
    let count = graph.add_node(
        Prompt::fixed(Visual::message("How many friends do you have?"))
            .config(config)
            .sync_transform(|m, data: Record| {
                let count = parse_number(&m)?;
                if count <= 1 {
                    return Err(StepError::reject(TOO_FEW_FRIENDS));
                }
                Ok(data.with("count", count))
            })
            .build(),
    );
    let friend = graph.add_node(
        Prompt::generated(|data: &Record| {
            Visual::message(format!(
                "What is the name of friend #{}?",
                data.get_array("friends").len() + 1
            ))
        })
        .config(config)
        .sync_transform(|m, data: Record| Ok(data.with_appended("friends", m.content.trim())))
        .build(),
    );
    let summary = graph.add_node(
        Prompt::generated(|data: &Record| {
            let names: Vec<&str> = data
                .get_array("friends")
                .iter()
                .filter_map(|v| v.as_str())
                .collect();
            Visual::message(format!("Your friends are: {}", names.join(", ")))
        })
        .build(),
    );

    graph.add_child(count, friend)?;
    graph
        .add_guarded_child(
            friend,
            friend,
            Guard::when(|data: &Record| {
                let named = data.get_array("friends").len() as i64;
                named < data.get_i64("count").unwrap_or_default()
            }),
        )?
        .add_child(friend, summary)?;
    Ok(DemoGraph { graph, root: count })
}

fn menu(config: &EngineConfig) -> anyhow::Result<DemoGraph> {
    let mut pager = MenuPager::from_config(&config.menu)
        .with_title("Pick your favourite colors")
        .with_description("Type numbers or ranges, e.g. `1, 3-4`.")
        .with_multi_select(true)
        .enable_pagination(|e, message| {
            warn!("Could not turn page of menu {}: {}", message.id(), e);
        });
    for (label, description) in COLORS {
        pager.add_option(*label, (!description.is_empty()).then_some(*description));
    }
    let pager = pager.into_shared();

    let invalid = config.messages.invalid_option.clone();

    let mut graph = PromptGraph::new();
    let select = {
        let pager = Arc::clone(&pager);
        graph.add_node(
            Prompt::fixed(Visual::shared_menu(Arc::clone(&pager)))
                .config(config)
                .transform(move |m, data: Record| {
                    let pager = Arc::clone(&pager);
                    let invalid = invalid.clone();
                    async move {
                        let pager = pager.lock().await;
                        let selection = pager
                            .parse_selection(&m.content)
                            .ok_or_else(|| StepError::reject(invalid))?;
                        let labels: Vec<String> = pager
                            .options()
                            .iter()
                            .filter(|o| selection.contains(&o.number))
                            .map(|o| o.label.clone())
                            .collect();
                        Ok(data.with("colors", labels))
                    }
                })
                .build(),
        )
    };
    let summary = graph.add_node(
        Prompt::generated(|data: &Record| {
            let colors: Vec<&str> = data
                .get_array("colors")
                .iter()
                .filter_map(|v| v.as_str())
                .collect();
            Visual::message(format!("You picked {}.", colors.join(", ")))
        })
        .build(),
    );
    graph.add_child(select, summary)?;
    Ok(DemoGraph {
        graph,
        root: select,
    })
}
