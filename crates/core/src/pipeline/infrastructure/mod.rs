pub mod threaded_worker;
