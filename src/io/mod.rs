pub mod library_io;
