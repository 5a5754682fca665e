use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("network timeout")]
    Timeout,

    #[error("该账号尚未分配角色")]
    NoSuchUser,

    #[error("账号或密码不正确")]
    InvalidCredentials,

    #[error("意料之外的登录返回页面: {0}")]
    UnexpectedPortalResponse(String),

    #[error("会话已过期，需要重新登录")]
    SessionExpired,

    #[error("表格行结构异常: {0}")]
    MalformedRow(String),

    #[error("无法解析的时间编码: {0}")]
    UnparsableTime(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Maps a transport-level reqwest error, separating timeouts so callers
    /// can tell them apart from protocol failures.
    pub(crate) fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Error::Timeout
        } else {
            Error::Http(error)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
