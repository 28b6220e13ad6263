mod lifecycle;
mod recovery;
mod sending;
