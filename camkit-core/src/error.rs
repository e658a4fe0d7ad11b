use std::borrow::Cow;

use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(Cow<'static, str>),
    #[error("Invalid state: {0}")]
    InvalidState(Cow<'static, str>),
    #[error("No device: {0}")]
    NoDevice(Cow<'static, str>),
    #[error("No memory: {0}")]
    NoMemory(Cow<'static, str>),
    #[error("Busy: {0}")]
    Busy(Cow<'static, str>),
    #[error("Not found: {0}")]
    NotFound(Cow<'static, str>),
    #[error("Failed: {0}")]
    Failed(Cow<'static, str>),
}

#[macro_export]
macro_rules! invalid_argument_error {
    ($param:literal) => {
        $crate::error::Error::InvalidArgument($param.into())
    };
    ($param:expr) => {
        $crate::error::Error::InvalidArgument(format!("{:?}", $param).into())
    };
}

#[macro_export]
macro_rules! invalid_state_error {
    ($param:literal) => {
        $crate::error::Error::InvalidState($param.into())
    };
    ($param:expr) => {
        $crate::error::Error::InvalidState(format!("{:?}", $param).into())
    };
}

#[macro_export]
macro_rules! no_device_error {
    ($param:literal) => {
        $crate::error::Error::NoDevice($param.into())
    };
    ($param:expr) => {
        $crate::error::Error::NoDevice(format!("{:?}", $param).into())
    };
}

#[macro_export]
macro_rules! not_found_error {
    ($param:literal) => {
        $crate::error::Error::NotFound($param.into())
    };
    ($param:expr) => {
        $crate::error::Error::NotFound(format!("{:?}", $param).into())
    };
}

#[macro_export]
macro_rules! failed_error {
    ($param:literal) => {
        $crate::error::Error::Failed($param.into())
    };
    ($param:expr) => {
        $crate::error::Error::Failed(format!("{:?}", $param).into())
    };
}
