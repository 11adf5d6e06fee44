pub mod scripted_executor;
