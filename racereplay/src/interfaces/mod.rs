pub mod viewer_interface;
