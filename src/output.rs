use std::{cell::RefCell, io::Write, rc::Rc};

#[derive(Clone, Default)]
pub enum Output {
    #[default]
    Stdout,
    Buffer(Rc<RefCell<String>>),
    Silent,
}

impl Output {
    pub fn buffer() -> Self {
        Output::Buffer(Rc::new(RefCell::new(String::new())))
    }

    pub fn println(&self, msg: &str) {
        match self {
            Output::Stdout => {
                let mut stdout = std::io::stdout().lock();
                // A closed pipe is not an interpreter error.
                let _ = writeln!(stdout, "{msg}");
            }
            Output::Buffer(buffer) => {
                let mut buffer = buffer.borrow_mut();
                buffer.push_str(msg);
                buffer.push('\n');
            }
            Output::Silent => {}
        }
    }

    pub fn contents(&self) -> String {
        match self {
            Output::Buffer(buffer) => buffer.borrow().clone(),
            _ => String::new(),
        }
    }

    pub fn clear(&self) {
        if let Output::Buffer(buffer) = self {
            buffer.borrow_mut().clear();
        }
    }
}
