use serenity::prelude::Mentionable;
use tokio::sync::mpsc;

use crate::{
    action::{Action, IncomingMessage},
    app::App,
    commands::{self, ChatCommand, Reply},
};

pub struct Worker {
    app: App,
    /// Actions to perform.
    actions: mpsc::Receiver<Action>,
}

impl Worker {
    pub fn new(app: App, actions: mpsc::Receiver<Action>) -> Self {
        Worker { app, actions }
    }

    /// Perform queued actions one at a time until every sender is gone.
    pub async fn run(mut self) {
        while let Some(action) = self.actions.recv().await {
            match action {
                Action::Command { message, command } => self.command(message, *command).await,
                Action::Usage { message, text } => {
                    self.reply(&message, Reply::text(format!("```\n{}\n```", text.trim_end())))
                        .await
                }
                Action::Record { message } => self.record(message).await,
            }
        }
        tracing::debug!("action queue closed, worker stopping");
    }

    async fn reply(&self, message: &IncomingMessage, reply: Reply) {
        let content = format!("{} {}", message.author.mention(), reply.content);
        let result = match reply.attachment {
            Some(attachment) => {
                self.app
                    .platform
                    .send_file(message.channel, &content, attachment)
                    .await
            }
            None => self.app.platform.send(message.channel, &content).await,
        };
        result.unwrap_or_else(|e| tracing::error!(error = ?e, "failed to reply"));
    }

    async fn command(&self, message: IncomingMessage, command: ChatCommand) {
        tracing::info!(
            user_name = ?message.author_name,
            user_id = ?message.author.to_string(),
            command = ?message.content,
            "running command"
        );

        let reply = match commands::execute(&self.app, &message.invocation(), command).await {
            Ok(reply) => reply,
            Err(error) if error.is_user_facing() => {
                tracing::debug!(%error, "command refused");
                Reply::text(error.to_string())
            }
            Err(error) => {
                tracing::error!(error = ?error, command = ?message.content, "command failed");
                Reply::text("Something went wrong on my end; the error has been logged.")
            }
        };
        self.reply(&message, reply).await;
    }

    async fn record(&self, message: IncomingMessage) {
        match self
            .app
            .roleplays
            .record_message(message.channel, &message.to_history())
            .await
        {
            Ok(true) => tracing::trace!(message_id = %message.id, "logged roleplay message"),
            Ok(false) => {}
            Err(error) => tracing::error!(
                error = ?error,
                message_id = %message.id,
                "failed to log roleplay message"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serenity::model::id::{ChannelId, MessageId};

    use super::*;
    use crate::commands::tests::{app, CHANNEL, OWNER, SERVER};

    fn incoming(id: u64, channel: ChannelId, content: &str) -> IncomingMessage {
        IncomingMessage {
            id: MessageId(id),
            server: SERVER,
            channel,
            author: OWNER,
            author_name: "Owner".to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn action(message: IncomingMessage) -> Action {
        Action::from_message("!", message).unwrap()
    }

    #[tokio::test]
    async fn worker_replies_and_records() {
        let (app, platform) = app().await;
        let (tx, rx) = mpsc::channel(16);

        tx.send(action(incoming(1, CHANNEL, "!rp create Tavern")))
            .await
            .unwrap();
        tx.send(action(incoming(2, CHANNEL, "!rp join")))
            .await
            .unwrap();
        tx.send(action(incoming(3, CHANNEL, "!hug")))
            .await
            .unwrap();
        drop(tx);
        Worker::new(app.clone(), rx).run().await;

        let replies = platform.sent_to(CHANNEL);
        assert_eq!(replies.len(), 3);
        assert!(replies[0].starts_with("<@10> Created **Tavern**"));
        // User mistakes are replied as-is
        assert!(replies[1].contains("Name a roleplay"));
        // Usage errors come back in a code block
        assert!(replies[2].contains("```"));

        let mut roleplay = app.roleplays.get(SERVER, "Tavern").await.unwrap();
        let channel = app.roleplays.start(&mut roleplay).await.unwrap();

        let (tx, rx) = mpsc::channel(16);
        tx.send(action(incoming(4, channel, "We enter the tavern.")))
            .await
            .unwrap();
        drop(tx);
        Worker::new(app.clone(), rx).run().await;

        let logged = app.store.messages(roleplay.id).await.unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].author_nickname, "Owner");
    }
}
