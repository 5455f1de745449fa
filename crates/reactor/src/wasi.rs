use crate::reactor::Pollable;

impl Pollable for ::wasi::io::poll::Pollable {
    fn ready(&self) -> bool {
        ::wasi::io::poll::Pollable::ready(self)
    }

    fn poll_list(list: &[&Self]) -> Vec<u32> {
        ::wasi::io::poll::poll(list)
    }
}
