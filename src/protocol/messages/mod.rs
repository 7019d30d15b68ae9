//! # Stock Messages
//!
//! The client and server messages the server understands out of the box.
//!
//! | id    | direction | message                  |
//! |-------|-----------|--------------------------|
//! | 10101 | in        | Login                    |
//! | 10108 | in        | KeepAlive                |
//! | 10212 | in        | ChangeAvatarName         |
//! | 14109 | in        | GoHomeFromOffline        |
//! | 14315 | in        | AllianceChat             |
//! | 20103 | out       | LoginFailed              |
//! | 20104 | out       | LoginOk                  |
//! | 20108 | out       | KeepAliveOk              |
//! | 24111 | out       | AvailableServerCommand   |
//! | 24312 | out       | AllianceChatServer       |

pub mod alliance_chat;
pub mod avatar_name;
pub mod home;
pub mod keep_alive;
pub mod login;

pub use alliance_chat::{AllianceChatMessage, AllianceChatServerMessage};
pub use avatar_name::{AvailableServerCommandMessage, ChangeAvatarNameMessage, ServerCommand};
pub use home::GoHomeFromOfflineMessage;
pub use keep_alive::{KeepAliveMessage, KeepAliveOkMessage};
pub use login::{LoginFailedMessage, LoginFailedReason, LoginMessage, LoginOkMessage};

/// Packet ids.
pub mod ids {
    pub const LOGIN: u16 = 10101;
    pub const KEEP_ALIVE: u16 = 10108;
    pub const CHANGE_AVATAR_NAME: u16 = 10212;
    pub const GO_HOME_FROM_OFFLINE: u16 = 14109;
    pub const ALLIANCE_CHAT: u16 = 14315;

    pub const LOGIN_FAILED: u16 = 20103;
    pub const LOGIN_OK: u16 = 20104;
    pub const KEEP_ALIVE_OK: u16 = 20108;
    pub const AVAILABLE_SERVER_COMMAND: u16 = 24111;
    pub const ALLIANCE_CHAT_SERVER: u16 = 24312;
}
