pub(crate) mod caps;
pub(crate) mod event_loop;
