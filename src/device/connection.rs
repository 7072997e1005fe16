use std::convert::Infallible;
use std::sync::Arc;
use iced::subscription::{self, Subscription};
use futures::{SinkExt, StreamExt};
use futures::channel::mpsc::{channel, Receiver, Sender, UnboundedReceiver};
use futures::future::pending;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use crate::config::types::DeviceProfile;
use crate::device::btle::BtleLink;
use crate::device::events::LogObserver;
use crate::device::link::BleLink;
use crate::device::session::{SessionController, SessionInput};
use crate::device::types::{DeviceEvent, SessionCommand};

/// Feeds user commands and link events into the controller until `cancel` is cancelled or the
/// command channel is closed.
pub async fn run_session<L: BleLink>(
    cancel: CancellationToken,
    mut controller: SessionController<L>,
    mut inbox: UnboundedReceiver<SessionInput>,
    mut commands: Receiver<SessionCommand>,
) {
    controller.publish_snapshot().await;

    'mainloop: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            command = commands.next() => match command {
                Some(command) => controller.handle_command(command).await,
                None => break 'mainloop,
            },
            Some(input) = inbox.next() => {
                controller.handle_input(input).await;
            },
        }
    }

    info!("Session worker stopping");
    controller.disconnect().await;
}

async fn connect_device(cancel: CancellationToken, profile: DeviceProfile, mut output: Sender<DeviceEvent>) -> Infallible {
    let link = match BtleLink::new().await {
        Ok(link) => Arc::new(link),
        Err(err) => {
            error!("Failed to open the bluetooth stack: {}", err);
            if let Err(err) = output.send(DeviceEvent::Unavailable(err.to_string())).await {
                error!("Failed to send DeviceEvent: {}", err);
            }
            return pending().await;
        },
    };

    let (command_sender, commands) = channel::<SessionCommand>(16);
    if let Err(err) = output.send(DeviceEvent::Ready(command_sender)).await {
        error!("Failed to send DeviceEvent: {}", err);
    }

    let (controller, inbox) = SessionController::new(
        link,
        profile,
        vec![output],
        Box::new(LogObserver),
    );

    run_session(cancel, controller, inbox, commands).await;

    // note: subscription::channel expects the future to never resolve (Infallible)
    pending().await
}

pub fn connect_device_subscription(cancel: CancellationToken, profile: DeviceProfile) -> Subscription<DeviceEvent> {
    struct Connect;

    subscription::channel(
        std::any::TypeId::of::<Connect>(),
        64,
        move |subscription_sender| {
            async move {
                connect_device(cancel, profile, subscription_sender).await
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use data_encoding::BASE64;

    use super::*;
    use crate::device::mock::{MockLink, RecordingObserver};
    use crate::device::types::DeviceState;

    #[tokio::test]
    async fn worker_runs_commands_and_stops_on_cancel() {
        let link = MockLink::new();
        link.advertise(&[Some("ESPFAN")]);
        link.set_message_payload(Some(BASE64.encode(b"Idle").into_bytes()));
        link.set_rpm_payload(Some(BASE64.encode(b"300").into_bytes()));
        let link = Arc::new(link);

        let (events, mut event_receiver) = channel::<DeviceEvent>(64);
        let (mut commands, command_receiver) = channel::<SessionCommand>(16);
        let (controller, inbox) = SessionController::new(
            link.clone(),
            DeviceProfile::default(),
            vec![events],
            Box::new(RecordingObserver::default()),
        );

        let cancel = CancellationToken::new();
        let worker = tokio::spawn(run_session(cancel.clone(), controller, inbox, command_receiver));

        commands.send(SessionCommand::Connect).await.unwrap();

        let mut connected = false;
        while let Some(event) = event_receiver.next().await {
            if let DeviceEvent::Rpm(300) = event {
                connected = true;
                break;
            }
        }
        assert!(connected);

        link.drop_link();
        loop {
            match event_receiver.next().await {
                Some(DeviceEvent::StateChange(DeviceState::Disconnected)) => break,
                Some(_) => continue,
                None => panic!("worker stopped early"),
            }
        }

        cancel.cancel();
        worker.await.unwrap();
        assert_eq!(link.count("disconnect"), 0);
    }
}
