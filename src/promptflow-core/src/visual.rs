//! What a prompt shows the user.
//!
//! A [`Visual`] is the engine-side description; an [`OutgoingMessage`] is the
//! snapshot handed to a transport. Menus are rendered one page at a time, so
//! the snapshot of a menu is a [`MenuPage`].

use serde::{Deserialize, Serialize};

use crate::menu::{MenuOption, MenuPager, SharedPager};

/// Transport-specific extras (embeds, formatting flags...). The engine never
/// interprets these.
pub type VisualOptions = serde_json::Map<String, serde_json::Value>;

/// Description of what to present to the user at a node.
#[derive(Debug, Clone)]
pub enum Visual {
    /// Plain text message.
    Message {
        /// Message body.
        text: String,
        /// Transport-specific extras.
        options: VisualOptions,
    },
    /// Numbered, optionally paginated menu.
    Menu {
        /// Options and page state.
        pager: SharedPager,
        /// Transport-specific extras.
        options: VisualOptions,
    },
}

impl Visual {
    /// Plain message visual with no extras.
    pub fn message(text: impl Into<String>) -> Self {
        Visual::Message {
            text: text.into(),
            options: VisualOptions::new(),
        }
    }

    /// Menu visual wrapping a pager.
    pub fn menu(pager: MenuPager) -> Self {
        Visual::Menu {
            pager: pager.into_shared(),
            options: VisualOptions::new(),
        }
    }

    /// Menu visual sharing an existing pager.
    pub fn shared_menu(pager: SharedPager) -> Self {
        Visual::Menu {
            pager,
            options: VisualOptions::new(),
        }
    }

    /// Attach a transport-specific option.
    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        match &mut self {
            Visual::Message { options, .. } | Visual::Menu { options, .. } => {
                options.insert(key.into(), value);
            }
        }
        self
    }

    /// Whether this visual is a menu.
    pub fn is_menu(&self) -> bool {
        matches!(self, Visual::Menu { .. })
    }

    /// The pager of a menu visual.
    pub fn pager(&self) -> Option<&SharedPager> {
        match self {
            Visual::Menu { pager, .. } => Some(pager),
            Visual::Message { .. } => None,
        }
    }

    /// Copy for a single render. A menu gets its own pager starting on the
    /// first page, so page turns never carry over to another visit or run.
    pub async fn fresh(&self) -> Visual {
        match self {
            Visual::Message { .. } => self.clone(),
            Visual::Menu { pager, options } => {
                let mut pager = pager.lock().await.clone();
                pager.reset_page();
                Visual::Menu {
                    pager: pager.into_shared(),
                    options: options.clone(),
                }
            }
        }
    }

    /// Snapshot for the transport. Menus show their current page.
    pub async fn to_outgoing(&self) -> OutgoingMessage {
        match self {
            Visual::Message { text, options } => OutgoingMessage::Text {
                text: text.clone(),
                options: options.clone(),
            },
            Visual::Menu { pager, options } => {
                let pager = pager.lock().await;
                OutgoingMessage::Menu {
                    page: pager.page_view(pager.page()),
                    options: options.clone(),
                }
            }
        }
    }
}

/// One rendered page of a menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuPage {
    /// Menu title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Text shown above the options.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Zero-based page index.
    pub page: usize,
    /// Total number of pages (at least 1).
    pub page_count: usize,
    /// Whether several options may be picked at once.
    pub multi_select: bool,
    /// Options on this page.
    pub options: Vec<MenuOption>,
}

impl MenuPage {
    /// Menu message showing this page, with no extras.
    pub fn into_outgoing(self) -> OutgoingMessage {
        OutgoingMessage::Menu {
            page: self,
            options: VisualOptions::new(),
        }
    }
}

/// Message handed to a transport for sending or editing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutgoingMessage {
    /// Plain text.
    Text {
        /// Message body.
        text: String,
        /// Transport-specific extras.
        #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
        options: VisualOptions,
    },
    /// One page of a menu.
    Menu {
        /// The page to show.
        page: MenuPage,
        /// Transport-specific extras.
        #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
        options: VisualOptions,
    },
}

impl OutgoingMessage {
    /// Plain text message with no extras.
    pub fn text(text: impl Into<String>) -> Self {
        OutgoingMessage::Text {
            text: text.into(),
            options: VisualOptions::new(),
        }
    }

    /// Text body, or `None` for menus.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            OutgoingMessage::Text { text, .. } => Some(text),
            OutgoingMessage::Menu { .. } => None,
        }
    }

    /// Menu page, or `None` for text.
    pub fn as_menu_page(&self) -> Option<&MenuPage> {
        match self {
            OutgoingMessage::Menu { page, .. } => Some(page),
            OutgoingMessage::Text { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_message_to_outgoing() {
        let visual = Visual::message("What is your name?").with_option("ephemeral", true.into());
        let outgoing = visual.to_outgoing().await;

        assert_eq!(outgoing.as_text(), Some("What is your name?"));
        match outgoing {
            OutgoingMessage::Text { options, .. } => {
                assert_eq!(options.get("ephemeral"), Some(&serde_json::Value::Bool(true)));
            }
            OutgoingMessage::Menu { .. } => panic!("expected text"),
        }
    }

    #[tokio::test]
    async fn test_menu_to_outgoing_shows_current_page() {
        let pager = MenuPager::new()
            .with_page_size(2)
            .option("red", None)
            .option("green", None)
            .option("blue", None);
        let visual = Visual::menu(pager);
        assert!(visual.is_menu());

        let outgoing = visual.to_outgoing().await;
        let page = outgoing.as_menu_page().expect("menu page");
        assert_eq!(page.page, 0);
        assert_eq!(page.page_count, 2);
        let labels: Vec<_> = page.options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["red", "green"]);
    }

    #[tokio::test]
    async fn test_fresh_menu_has_own_pager_on_first_page() {
        let pager = MenuPager::new()
            .with_page_size(1)
            .option("red", None)
            .option("green", None)
            .into_shared();
        pager.lock().await.step_forward();
        let visual = Visual::shared_menu(pager.clone());

        let fresh = visual.fresh().await;
        let fresh_pager = fresh.pager().unwrap();
        assert!(!Arc::ptr_eq(fresh_pager, &pager));
        assert_eq!(fresh_pager.lock().await.page(), 0);
        assert_eq!(pager.lock().await.page(), 1);

        fresh_pager.lock().await.step_forward();
        let shown = visual.fresh().await.to_outgoing().await;
        assert_eq!(shown.as_menu_page().unwrap().page, 0);
    }

    #[test]
    fn test_outgoing_serialization_is_tagged() {
        let json = serde_json::to_value(OutgoingMessage::text("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "text", "text": "hi"}));
    }
}
