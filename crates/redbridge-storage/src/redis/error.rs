use bb8::RunError;
use redbridge_core::Error;
use redis::RedisError;

/// Classify a driver error
///
/// Network-level failures become [`Error::Connection`]; anything the server
/// answered with becomes [`Error::Backend`].
pub(crate) fn map_redis_error(err: RedisError) -> Error {
    if err.is_connection_refusal() || err.is_timeout() || err.is_connection_dropped() {
        Error::Connection(err.to_string())
    } else {
        Error::Backend(err.to_string())
    }
}

pub(crate) fn map_run_error(err: RunError<RedisError>) -> Error {
    match err {
        RunError::User(err) => map_redis_error(err),
        RunError::TimedOut => Error::Timeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout() {
        assert!(matches!(map_run_error(RunError::TimedOut), Error::Timeout));
    }

    #[test]
    fn test_refused_is_connection_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            map_run_error(RunError::User(RedisError::from(io))),
            Error::Connection(_)
        ));
    }
}
