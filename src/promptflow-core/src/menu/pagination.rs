//! Reaction-driven page turning for menus.
//!
//! When a paginating menu is sent, a background task adds the previous/next
//! reactions to the message and turns pages whenever the user clicks one.
//! Every failure in this task goes to the pager's error handler; nothing is
//! propagated to the prompt that is collecting the user's answer.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::channel::{Channel, PlatformMessage, ReactionFilter};
use crate::menu::SharedPager;

/// Handle to a running pagination task. Dropping it stops the task.
#[derive(Debug)]
pub struct PaginationHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PaginationHandle {
    /// Stop reacting to page turns.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the task has finished (cancelled, timed out, or failed setup).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PaginationHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Start turning pages of `pager` on `message` in response to reactions.
pub fn spawn_pagination(
    pager: SharedPager,
    message: Arc<dyn PlatformMessage>,
    channel: Arc<dyn Channel>,
) -> PaginationHandle {
    let token = CancellationToken::new();
    let task_token = token.clone();

    let task = tokio::spawn(async move {
        let (symbols, timeout) = {
            let pager = pager.lock().await;
            (pager.symbols().clone(), pager.pagination_timeout())
        };

        for symbol in [&symbols.previous, &symbols.next] {
            if let Err(e) = message.react(symbol).await {
                pager
                    .lock()
                    .await
                    .report_pagination_error(&e, message.as_ref());
                return;
            }
        }

        let filter = ReactionFilter::new([symbols.previous.clone(), symbols.next.clone()]);
        let mut reactions = channel.subscribe_reactions(message.as_ref(), filter, timeout);

        loop {
            let reaction = tokio::select! {
                biased;
                _ = task_token.cancelled() => break,
                reaction = reactions.recv() => match reaction {
                    Some(reaction) => reaction,
                    None => break,
                },
            };

            // The pager lock is not held across the edit.
            let view = {
                let mut pager = pager.lock().await;
                if reaction.symbol == symbols.previous {
                    pager.step_back()
                } else {
                    pager.step_forward()
                }
            };
            let Some(view) = view else { continue };
            let shown = view.page;
            match message.edit(view.into_outgoing()).await {
                Ok(()) => debug!("Menu {} now on page {}", message.id(), shown),
                Err(e) => pager
                    .lock()
                    .await
                    .report_pagination_error(&e, message.as_ref()),
            }
        }

        reactions.stop();
        debug!("Pagination stopped for menu {}", message.id());
    });

    PaginationHandle { token, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::channel::{MemoryChannel, Reaction};
    use crate::menu::MenuPager;
    use crate::visual::OutgoingMessage;

    fn three_page_menu(errors: Arc<AtomicUsize>) -> SharedPager {
        MenuPager::new()
            .with_page_size(1)
            .option("option1", Some("d"))
            .option("option2", Some("d"))
            .option("option3", Some("d"))
            .enable_pagination(move |_, _| {
                errors.fetch_add(1, Ordering::SeqCst);
            })
            .into_shared()
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_reactions_turn_pages() {
        let channel = MemoryChannel::new("pages");
        let errors = Arc::new(AtomicUsize::new(0));
        let pager = three_page_menu(errors.clone());
        let message = channel.send(OutgoingMessage::text("menu")).await.unwrap();
        let message_id = message.id().to_string();

        let handle = spawn_pagination(pager.clone(), message, Arc::new(channel.clone()));

        let delivered = channel
            .react_when_ready(&message_id, Reaction::new("user", "▶"))
            .await;
        assert_eq!(delivered, 1);
        assert!(wait_for(|| channel.edits(&message_id).len() == 1).await);
        assert_eq!(pager.lock().await.page(), 1);
        assert_eq!(channel.reactions_on(&message_id), vec!["◀", "▶"]);

        let shown = channel.edits(&message_id)[0].clone();
        let page = shown.as_menu_page().unwrap();
        assert_eq!(page.options.len(), 1);
        assert_eq!(page.options[0].label, "option2");

        handle.cancel();
        assert!(wait_for(|| channel.active_reaction_subscriptions() == 0).await);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bot_and_foreign_reactions_are_ignored() {
        let channel = MemoryChannel::new("pages");
        let pager = three_page_menu(Arc::new(AtomicUsize::new(0)));
        let message = channel.send(OutgoingMessage::text("menu")).await.unwrap();
        let message_id = message.id().to_string();
        let _handle = spawn_pagination(pager.clone(), message, Arc::new(channel.clone()));

        channel
            .react_when_ready(&message_id, Reaction::new("bot", "▶").from_bot())
            .await;
        channel.react(&message_id, Reaction::new("user", "👍"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(pager.lock().await.page(), 0);
        assert!(channel.edits(&message_id).is_empty());
    }

    #[tokio::test]
    async fn test_edit_failure_goes_to_error_handler() {
        let channel = MemoryChannel::new("pages");
        let errors = Arc::new(AtomicUsize::new(0));
        let pager = three_page_menu(errors.clone());
        let message = channel.send(OutgoingMessage::text("menu")).await.unwrap();
        let message_id = message.id().to_string();
        let _handle = spawn_pagination(pager, message, Arc::new(channel.clone()));

        channel.set_fail_edits(true);
        channel
            .react_when_ready(&message_id, Reaction::new("user", "▶"))
            .await;

        assert!(wait_for(|| errors.load(Ordering::SeqCst) == 1).await);
    }

    #[tokio::test]
    async fn test_pager_unlocked_during_slow_edit() {
        let channel = MemoryChannel::new("pages");
        let pager = three_page_menu(Arc::new(AtomicUsize::new(0)));
        let message = channel.send(OutgoingMessage::text("menu")).await.unwrap();
        let message_id = message.id().to_string();
        let _handle = spawn_pagination(pager.clone(), message, Arc::new(channel.clone()));

        channel.set_edit_delay(Some(Duration::from_secs(30)));
        channel
            .react_when_ready(&message_id, Reaction::new("user", "▶"))
            .await;

        let turned = wait_for(|| pager.try_lock().is_ok_and(|p| p.page() == 1)).await;
        assert!(turned);
        assert!(pager.lock().await.is_valid_selection("3"));
        assert!(channel.edits(&message_id).is_empty());
    }

    #[tokio::test]
    async fn test_react_failure_ends_task_quietly() {
        let channel = MemoryChannel::new("pages");
        let errors = Arc::new(AtomicUsize::new(0));
        let pager = three_page_menu(errors.clone());
        let message = channel.send(OutgoingMessage::text("menu")).await.unwrap();
        channel.set_fail_reactions(true);

        let handle = spawn_pagination(pager, message, Arc::new(channel.clone()));

        assert!(wait_for(|| handle.is_finished()).await);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(channel.active_reaction_subscriptions(), 0);
    }
}
