/// Logs an error at the point it is created and evaluates to it.
///
/// Catching and reporting errors further up the call stack frequently does not
/// provide enough information to be useful for debugging, so fault sites log
/// with file and line before the error starts travelling up through `?`.
/// Logging is compiled in only for debug builds.
macro_rules! err {
  ($level:ident, $error:expr) => {{
    let error = $error;

    #[cfg(debug_assertions)]
    {
      ::log::$level!("{}:{}: {:?}", file!(), line!(), &error);
    }

    error
  }};
}
