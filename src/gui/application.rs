use std::path::PathBuf;
use futures::channel::mpsc::Sender;
use iced::{Alignment, Application, Command, Element, Length, Settings, Size, Subscription, window};
use iced::event::{self, Event};
use iced::theme::{self, Theme};
use iced::widget::{button, column, container, text, vertical_slider, Column};
use log::{error, info, warn};
use tokio_util::sync::{CancellationToken};

use crate::config::io::{ConfigIO};
use crate::config::types::DeviceProfile;
use crate::device::connection::connect_device_subscription;
use crate::device::constants::{INITIAL_MESSAGE, RPM_MAX, RPM_MIN, RPM_STEP};
use crate::device::types::{DeviceEvent, DeviceState, SessionCommand};
use crate::error::AppRunError;
use crate::gui::executor::MyExecutor;
use crate::gui::style::{RpmSliderStyleSheet};
use crate::gui::types::{Message};

pub struct ApplicationFlags {
    profile: DeviceProfile,
}

pub struct MyApplication {
    // this token is cancelled upon exit
    app_cancel: CancellationToken,

    // messages that the user must click away
    notices: Vec<String>,

    profile: DeviceProfile,

    // None until the session worker is running
    command_sender: Option<Sender<SessionCommand>>,

    // latest state from the device
    latest_device_state: DeviceState,
    message: String,
    // last value read from the device or sent by the session
    rpm: u16,
    // position of the slider while it is being dragged, never sent
    slider_rpm: u16,
}

impl MyApplication {
    fn with_profile(profile: DeviceProfile) -> Self {
        MyApplication {
            app_cancel: CancellationToken::new(),
            notices: Vec::new(),
            profile,
            command_sender: None,
            latest_device_state: DeviceState::Initial,
            message: INITIAL_MESSAGE.to_string(),
            rpm: 0,
            slider_rpm: 0,
        }
    }

    fn before_close(&mut self) {
        self.app_cancel.cancel();
    }

    fn send_command(&mut self, command: SessionCommand) {
        let Some(sender) = self.command_sender.as_mut() else {
            warn!("Bluetooth session is not ready, dropping {:?}", command);
            return;
        };

        if let Err(err) = sender.try_send(command) {
            error!("Failed to send command to the bluetooth session: {}", err);
        }
    }

    fn handle_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Ready(sender) => {
                info!("Bluetooth session ready");
                self.command_sender = Some(sender);
            },
            DeviceEvent::Unavailable(reason) => {
                self.notices.push(format!("Bluetooth is not available: {}", reason));
            },
            DeviceEvent::StateChange(state) => {
                self.latest_device_state = state;
            },
            DeviceEvent::Message(message) => {
                self.message = message;
            },
            DeviceEvent::Rpm(rpm) => {
                self.rpm = rpm;
                self.slider_rpm = rpm;
            },
        }
    }
}

impl Application for MyApplication {
    type Executor = MyExecutor;
    type Message = Message;
    type Theme = Theme;
    type Flags = ApplicationFlags;

    fn new(flags: ApplicationFlags) -> (MyApplication, Command<Self::Message>) {
        (MyApplication::with_profile(flags.profile), Command::none())
    }

    fn title(&self) -> String {
        String::from(concat!("ESPFAN Remote ", env!("CARGO_PKG_VERSION")))
    }

    fn update(&mut self, message: Message) -> Command<Self::Message> {
        match message {
            Message::NoticeConfirmed => {
                if !self.notices.is_empty() {
                    self.notices.remove(0);
                }
            },
            Message::EventOccurred(Event::Window(id, window::Event::CloseRequested)) => {
                info!("Close requested");
                self.before_close();
                return window::close(id);
            },
            Message::DeviceEvent(event) => {
                self.handle_device_event(event);
            },
            Message::ConnectPress => {
                self.send_command(SessionCommand::Connect);
            },
            Message::DisconnectPress => {
                self.send_command(SessionCommand::Disconnect);
            },
            Message::RpmDragged(value) => {
                self.slider_rpm = value;
            },
            Message::RpmReleased => {
                let value = self.slider_rpm;
                info!("RPM committed: {}", value);
                // the label follows the Rpm event of the session once the value is sent
                self.send_command(SessionCommand::SendRpm(value));
            },

            _ => {}
        }

        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        Subscription::batch([
            event::listen().map(Message::EventOccurred),
            connect_device_subscription(
                self.app_cancel.clone(),
                self.profile.clone(),
            ).map(Message::DeviceEvent),
        ])
    }

    fn view(&self) -> Element<Message> {
        if let Some(notice) = self.notices.first() {
            return container(
                column![
                    text(notice),

                    button(text("Okay"))
                        .on_press(Message::NoticeConfirmed),

                ].align_items(Alignment::Center).spacing(20),
            )
            .width(Length::Fill)
            .padding(20)
            .into()
        }

        let connected = self.latest_device_state.is_connected();

        let device_state = match self.latest_device_state {
            DeviceState::Scanning => "Scanning…",
            DeviceState::Connecting => "Connecting…",
            _ => "",
        };

        let mut toggle = button(text(if connected { "Disconnect" } else { "Connect" }))
            .style(if connected { theme::Button::Destructive } else { theme::Button::Primary })
            .width(120);

        if self.command_sender.is_some() && !self.latest_device_state.is_busy() {
            toggle = toggle.on_press(if connected { Message::DisconnectPress } else { Message::ConnectPress });
        }

        let mut content: Column<Message> = column![
            text("FAN PROJECT").size(32),
            text(&self.message).size(20),
        ]
            .spacing(20)
            .align_items(Alignment::Center);

        if connected {
            content = content.push(
                column![
                    vertical_slider(RPM_MIN..=RPM_MAX, self.slider_rpm, Message::RpmDragged)
                        .step(RPM_STEP)
                        .on_release(Message::RpmReleased)
                        .width(50.0)
                        .height(300.0)
                        .style(theme::Slider::Custom(Box::new(RpmSliderStyleSheet))),

                    text(format!("{} RPM", self.rpm)),
                ]
                    .spacing(10)
                    .align_items(Alignment::Center),
            );
        }

        content = content
            .push(text(device_state).size(14))
            .push(toggle);

        container(content)
            .width(Length::Fill)
            .padding(20)
            .center_x()
            .into()
    }
}

pub fn run_application(config_path: Option<PathBuf>) -> Result<(), AppRunError> {
    let mut config_io = ConfigIO::open(config_path)?;
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;

    // fail before opening a window if the device identifiers are not usable
    let config = config_io.read_or_init()?;
    let profile = config.validate()?;
    info!(
        "Using {}: looking for \"{}\" (service {}, payload encoding {})",
        config_io.path().to_string_lossy(),
        profile.target_name,
        profile.service,
        config.payload_encoding,
    );

    let flags = ApplicationFlags { profile };
    let mut settings = Settings::with_flags(flags);

    // handle exits ourselves (Event::CloseRequested)
    settings.id = Some("espfan-remote".to_string());
    settings.window.exit_on_close_request = false;
    settings.window.size = Size::new(360.0, 640.0);
    settings.window.resizable = false;

    // this function will call process::exit() unless there was a startup error
    MyApplication::run(settings)?;
    Ok(())
}
