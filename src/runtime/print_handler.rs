use std::cell::RefCell;

/// Where `print` output goes.
#[derive(Debug, Default)]
pub enum PrintHandler {
    #[default]
    Stdout,
    /// Captures output, for tests and embedding.
    Buffer(RefCell<String>),
}

impl PrintHandler {
    pub fn buffer() -> Self {
        PrintHandler::Buffer(RefCell::new(String::new()))
    }

    pub fn println(&self, msg: &str) {
        match self {
            PrintHandler::Stdout => println!("{msg}"),
            PrintHandler::Buffer(buffer) => {
                let mut buffer = buffer.borrow_mut();
                buffer.push_str(msg);
                buffer.push('\n');
            }
        }
    }

    /// Everything captured so far. Always empty for stdout.
    pub fn output(&self) -> String {
        match self {
            PrintHandler::Stdout => String::new(),
            PrintHandler::Buffer(buffer) => buffer.borrow().clone(),
        }
    }
}
