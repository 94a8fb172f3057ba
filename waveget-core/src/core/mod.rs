pub mod acquisition;
pub mod backend;
pub mod dependencies;
pub mod events;
pub mod ffmpeg;
pub mod probe;
pub mod process;
pub mod session;
pub mod ytdlp;
