mod screen_print;
