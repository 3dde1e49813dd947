use std::fmt::Debug;

pub trait ErrorUtils {
    fn print_error(&self, msg: &str);
}

impl<T, E: Debug> ErrorUtils for Result<T, E> {
    fn print_error(&self, msg: &str) {
        if let Err(e) = self {
            log::error!("{}: {:?}", msg, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorUtils;

    #[test]
    fn print_error_ignores_ok() {
        let res: Result<u8, String> = Ok(1);
        res.print_error("should not print");
        let res: Result<u8, String> = Err("boom".to_string());
        res.print_error("should print");
    }
}
