mod documents;
mod lifecycle;
mod requests;
